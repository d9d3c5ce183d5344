use std::fmt;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, builder::BoolishValueParser};

use crate::cache::{Domain, ListParams, Partition, QueryKey};
use crate::domain::entities::{ContentPatch, NewContent};
use crate::domain::types::{ContentType, SortField, SortOrder, TagMatch};

/// Command-line arguments for the shelfmark binary.
#[derive(Debug, Parser)]
#[command(
    name = "shelfmark",
    version,
    about = "Bookmarks, notes and prompts from the terminal"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SHELFMARK_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the API base URL.
    #[arg(long = "api-url", value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print one page of a list view.
    List(ListArgs),
    /// Create a bookmark, note or prompt.
    Create(CreateArgs),
    /// Change fields of an item.
    Update(UpdateArgs),
    /// Move an item to the archive.
    Archive(ItemArgs),
    /// Move an archived item back to the active list.
    Unarchive(ItemArgs),
    /// Move an item to the trash, or purge it with --permanent.
    Delete(DeleteArgs),
    /// Bring an item back from the trash.
    Restore(ItemArgs),
    /// Print tag usage counts.
    Tags,
}

#[derive(Debug, Args, Clone)]
pub struct ListArgs {
    /// Which lists to read; `content` mixes all types.
    #[arg(value_enum)]
    pub domain: DomainArg,

    #[arg(long, value_enum, default_value_t = ViewArg::Active, conflicts_with = "filter_id")]
    pub view: ViewArg,

    /// Saved filter to list instead of a view.
    #[arg(long = "filter-id", value_name = "ID")]
    pub filter_id: Option<String>,

    #[arg(long = "search", short = 'q')]
    pub search: Option<String>,

    /// Tag filter; repeat for several tags.
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Match any of the tags instead of all of them.
    #[arg(long = "any-tag", action = clap::ArgAction::SetTrue)]
    pub any_tag: bool,

    #[arg(long = "sort-by", value_enum)]
    pub sort_by: Option<SortFieldArg>,

    #[arg(long, action = clap::ArgAction::SetTrue, requires = "sort_by")]
    pub ascending: bool,

    #[arg(long, default_value_t = 0)]
    pub offset: u64,

    #[arg(long, default_value_t = 20)]
    pub limit: u64,

    /// Restrict a `content` listing to some types; repeatable.
    #[arg(long = "type", value_enum)]
    pub content_types: Vec<ContentTypeArg>,
}

impl ListArgs {
    pub fn partition(&self) -> Partition {
        match &self.filter_id {
            Some(id) => Partition::custom(id.clone()),
            None => self.view.into(),
        }
    }

    pub fn tag_match(&self) -> TagMatch {
        if self.any_tag {
            TagMatch::Any
        } else {
            TagMatch::All
        }
    }

    pub fn sort(&self) -> Option<(SortField, SortOrder)> {
        let order = if self.ascending {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        };
        self.sort_by.map(|field| (field.into(), order))
    }

    pub fn query_key(&self) -> QueryKey {
        let mut params = ListParams::page(self.offset, self.limit).with_tags(self.tags.iter().cloned());
        params.tag_match = self.tag_match();
        if let Some(search) = &self.search {
            params = params.with_search(search.clone());
        }
        if let Some((field, order)) = self.sort() {
            params = params.with_sort(field, order);
        }
        params.content_types = self
            .content_types
            .iter()
            .copied()
            .map(ContentType::from)
            .collect();

        QueryKey::new(self.domain.into(), self.partition(), params)
    }
}

#[derive(Debug, Args, Clone)]
pub struct CreateArgs {
    #[arg(value_enum)]
    pub content_type: ContentTypeArg,

    #[arg(long)]
    pub title: Option<String>,

    /// Prompt identifier.
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub url: Option<String>,

    /// Full body of a note or prompt.
    #[arg(long)]
    pub content: Option<String>,

    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
}

impl CreateArgs {
    pub fn new_content(&self) -> NewContent {
        NewContent {
            title: self.title.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            url: self.url.clone(),
            content: self.content.clone(),
            tags: self.tags.clone(),
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct UpdateArgs {
    #[arg(value_enum)]
    pub content_type: ContentTypeArg,

    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, conflicts_with = "clear_description")]
    pub description: Option<String>,

    #[arg(long = "clear-description", action = clap::ArgAction::SetTrue)]
    pub clear_description: bool,

    #[arg(long)]
    pub url: Option<String>,

    #[arg(long)]
    pub content: Option<String>,

    /// Replace the tag set; repeat for several tags.
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Option<Vec<String>>,

    /// Remove every tag.
    #[arg(long = "clear-tags", action = clap::ArgAction::SetTrue, conflicts_with = "tags")]
    pub clear_tags: bool,

    /// Version the edit was based on; the server refuses stale edits.
    #[arg(long = "expected-version", value_name = "VERSION")]
    pub expected_version: Option<i64>,
}

impl UpdateArgs {
    /// Patch carrying only the fields given on the command line.
    pub fn patch(&self) -> ContentPatch {
        let description = if self.clear_description {
            Some(None)
        } else {
            self.description.clone().map(Some)
        };
        let tags = if self.clear_tags {
            Some(Vec::new())
        } else {
            self.tags.clone()
        };

        ContentPatch {
            title: self.title.clone(),
            name: self.name.clone(),
            description,
            url: self.url.clone(),
            tags,
            content: self.content.clone(),
            expected_version: self.expected_version,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct ItemArgs {
    #[arg(value_enum)]
    pub content_type: ContentTypeArg,

    pub id: String,
}

#[derive(Debug, Args, Clone)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub item: ItemArgs,

    /// Purge from the trash instead of moving to it.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub permanent: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ContentTypeArg {
    Bookmark,
    Note,
    Prompt,
}

impl From<ContentTypeArg> for ContentType {
    fn from(value: ContentTypeArg) -> Self {
        match value {
            ContentTypeArg::Bookmark => ContentType::Bookmark,
            ContentTypeArg::Note => ContentType::Note,
            ContentTypeArg::Prompt => ContentType::Prompt,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DomainArg {
    Bookmark,
    Note,
    Prompt,
    Content,
}

impl From<DomainArg> for Domain {
    fn from(value: DomainArg) -> Self {
        match value {
            DomainArg::Bookmark => Domain::Bookmark,
            DomainArg::Note => Domain::Note,
            DomainArg::Prompt => Domain::Prompt,
            DomainArg::Content => Domain::Content,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ViewArg {
    Active,
    Archived,
    Deleted,
}

impl From<ViewArg> for Partition {
    fn from(value: ViewArg) -> Self {
        match value {
            ViewArg::Active => Partition::Active,
            ViewArg::Archived => Partition::Archived,
            ViewArg::Deleted => Partition::Deleted,
        }
    }
}

impl fmt::Display for ViewArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ViewArg::Active => "active",
            ViewArg::Archived => "archived",
            ViewArg::Deleted => "deleted",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SortFieldArg {
    CreatedAt,
    UpdatedAt,
    LastUsedAt,
    ArchivedAt,
    DeletedAt,
    Title,
}

impl From<SortFieldArg> for SortField {
    fn from(value: SortFieldArg) -> Self {
        match value {
            SortFieldArg::CreatedAt => SortField::CreatedAt,
            SortFieldArg::UpdatedAt => SortField::UpdatedAt,
            SortFieldArg::LastUsedAt => SortField::LastUsedAt,
            SortFieldArg::ArchivedAt => SortField::ArchivedAt,
            SortFieldArg::DeletedAt => SortField::DeletedAt,
            SortFieldArg::Title => SortField::Title,
        }
    }
}
