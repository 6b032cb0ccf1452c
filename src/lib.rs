//! # word_cleaner
//!
//! Removes Microsoft Word markup from HTML fragments while keeping the
//! document's structure, with a two-tier cache in front of the engine.
//!
//! ## Overview
//!
//! Content pasted or imported from Word arrives full of `mso-*` styles,
//! `Mso*` classes, Office XML namespace tags, conditional comments and
//! paragraph-based pseudo-lists. `word_cleaner` strips those while
//! preserving tables (rows, cells, nesting), lists and everything that did
//! not come from Word. Content without Word markup is returned untouched.
//!
//! Two interchangeable paths do the work:
//!
//! - a tree path that parses the fragment with `scraper` and rewrites
//!   attributes node by node, and
//! - a pattern path of ordered regex substitutions, used for short text
//!   fields, when the tree path is switched off, or when parsing fails.
//!
//! Tables and lists are lifted out before either path runs and rebuilt in a
//! canonical form afterwards.
//!
//! What gets removed is controlled by a [`CleaningPolicy`] of named
//! switches, resolved per content type from built-in defaults and an
//! optional [`PolicyStore`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use word_cleaner::{CleanerBuilder, FsCache};
//!
//! # async fn example() {
//! let cleaner = CleanerBuilder::new()
//!     .external_cache(FsCache::new("/tmp/word_cleaner"))
//!     .build();
//!
//! let html = r#"<p class="MsoNormal" style="mso-margin-top-alt:auto">Hello<o:p></o:p></p>"#;
//! assert_eq!(cleaner.clean(html, "post", None).await, "<p>Hello</p>");
//!
//! // On shutdown, flush pending external-cache writes:
//! cleaner.shutdown().await;
//! # }
//! ```
//!
//! Without a runtime or a cache, use [`clean`]:
//!
//! ```
//! let html = r#"<p class="MsoNormal">Hello<o:p></o:p></p>"#;
//! assert_eq!(word_cleaner::clean(html, "post", None), "<p>Hello</p>");
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `fs-cache` | **yes** | Enables [`FsCache`], a file-per-key external cache tier. |

pub mod cache;
pub mod cleaner;
pub mod config;
pub mod engine;
pub mod error;
pub mod fields;
pub mod policy;
pub mod report;
mod worker;

#[cfg(feature = "fs-cache")]
pub use cache::FsCache;
pub use cache::{CacheKey, CacheStats, ExternalCache, MemoryCache, NoopCache};
pub use cleaner::ContentCleaner;
pub use config::CleanerBuilder;
pub use engine::{CleanOutcome, CleaningPath, Engine, ListStrategy, TreeStatistics, contains_word_markup};
pub use error::{CleanerError, Result};
pub use fields::Field;
pub use policy::{CleaningPolicy, PolicyStore, StaticPolicyStore, Switch, resolve_policy};
pub use report::ChangeReport;

/// Clean `content` without any caching, using the built-in defaults for
/// `content_type` unless `policy_override` is given.
pub fn clean(content: &str, content_type: &str, policy_override: Option<&CleaningPolicy>) -> String {
    let policy = policy_override
        .copied()
        .unwrap_or_else(|| CleaningPolicy::for_content_type(content_type));
    Engine::default().clean(content, content_type, &policy)
}
