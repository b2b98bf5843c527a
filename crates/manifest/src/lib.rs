//! WorldPop catalog: manifest store, query resolution and country selection.
//!
//! The [`ManifestStore`] keeps a local copy of the WorldPop dataset catalog
//! in sync with the remote one by comparing content hashes. The
//! [`QueryResolver`] validates requests against the loaded [`Manifest`] and
//! turns them into the set of files the download engine must materialize.

pub mod entry;
pub mod locator;
pub mod manifest;
pub mod resolver;
pub mod source;
pub mod store;

pub use entry::{parse_catalog, ManifestEntry, RawRecord};
pub use locator::{BoundsCountryLocator, CountryLocator};
pub use manifest::Manifest;
pub use resolver::{QueryResolver, Resolution, ResolvedFile, ResolvedFileSet};
pub use source::{CatalogSource, HttpCatalogSource, DEFAULT_BASE_URL};
pub use store::{ManifestStore, RefreshOutcome};
