//! Screen models.
//!
//! Each model owns the observable state one screen renders and the actions it
//! accepts. State is published through `tokio::sync::watch` channels so any
//! front end can subscribe; actions spawn tasks that are cancelled on
//! `dispose()`.
//!
//! - `browser`: breed list, paging, search and the favorites filter
//! - `detail`: one breed with its gallery
//! - `notice`: how failures are surfaced and de-duplicated

pub mod browser;
pub mod detail;
pub mod notice;

pub use browser::{CatalogBrowser, SearchState};
pub use detail::BreedDetail;
pub use notice::{Notice, NoticeGate, NoticeKind};
