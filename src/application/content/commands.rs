use std::panic;

use crate::application::error::MutationError;
use crate::application::repos::RepoError;
use crate::domain::entities::ContentItem;
use crate::domain::types::ContentType;

use super::intent::MutationIntent;
use super::lifecycle::{MutationController, MutationTicket};
use super::service::ContentService;

/// Result of a settled mutation.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    /// The item as the server now has it; deletes return none.
    pub item: Option<ContentItem>,
    pub ticket: MutationTicket,
}

impl ContentService {
    /// Apply `intent` optimistically, send it, then settle or roll back.
    ///
    /// The lifecycle runs on its own task: dropping the returned future does
    /// not abort a pending mutation, it still settles or rolls back.
    pub async fn mutate(
        &self,
        content_type: ContentType,
        intent: MutationIntent,
    ) -> Result<MutationOutcome, MutationError> {
        let service = self.clone();
        let handle = tokio::spawn(async move { service.run_mutation(content_type, intent).await });

        match handle.await {
            Ok(result) => result,
            Err(error) if error.is_panic() => panic::resume_unwind(error.into_panic()),
            Err(_) => Err(MutationError::Interrupted),
        }
    }

    async fn run_mutation(
        &self,
        content_type: ContentType,
        intent: MutationIntent,
    ) -> Result<MutationOutcome, MutationError> {
        let ticket = self.next_ticket(content_type, intent.kind());
        let mut controller = MutationController::new(ticket, &self.refetcher);
        controller.begin(&intent);

        match self.send(content_type, &intent).await {
            Ok(item) => {
                let ticket = controller.settle(&self.trigger, intent.touches_tags());
                Ok(MutationOutcome { item, ticket })
            }
            Err(error) => {
                let error = MutationError::from_repo(intent.item_id(), error);
                controller.roll_back(error.outcome_label(), &error);
                Err(error)
            }
        }
    }

    async fn send(
        &self,
        content_type: ContentType,
        intent: &MutationIntent,
    ) -> Result<Option<ContentItem>, RepoError> {
        match intent {
            MutationIntent::Create(content) => {
                self.writer.create(content_type, content).await.map(Some)
            }
            MutationIntent::Update { id, patch } => {
                self.writer.update(content_type, id, patch).await.map(Some)
            }
            MutationIntent::Delete { id, permanent } => self
                .writer
                .delete(content_type, id, *permanent)
                .await
                .map(|()| None),
            MutationIntent::Archive { id } => self.writer.archive(content_type, id).await.map(Some),
            MutationIntent::Unarchive { id } => {
                self.writer.unarchive(content_type, id).await.map(Some)
            }
            MutationIntent::Restore { id } => self.writer.restore(content_type, id).await.map(Some),
        }
    }
}
