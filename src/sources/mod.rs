//! Built-in provider tables, each behind its own feature flag.
//!
//! # Feature Flags
//!
//! - `source-mangadex` - MangaDex (JSON API)
//! - `source-mangakakalot` - MangaKakalot (HTML scraping)
//! - `source-kissmanga` - KissManga (Madara theme)
//! - `all-sources` - all of the above (default)
//!
//! Build with only MangaDex support:
//! ```bash
//! cargo build --no-default-features --features source-mangadex
//! ```
//!
//! Every table is a plain [`ProviderConfig`](crate::provider::ProviderConfig);
//! the functions here build it into a ready provider on the shared client.

use crate::error::Result;
use crate::provider::{self, Provider};
use crate::search::Providers;
use std::sync::Arc;

#[cfg(feature = "source-kissmanga")]
pub mod kissmanga;
#[cfg(feature = "source-mangadex")]
pub mod mangadex;
#[cfg(feature = "source-mangakakalot")]
pub mod mangakakalot;

#[cfg(feature = "source-mangadex")]
pub fn mangadex() -> Result<Arc<dyn Provider>> {
    provider::build(mangadex::config())
}

#[cfg(feature = "source-mangakakalot")]
pub fn mangakakalot() -> Result<Arc<dyn Provider>> {
    provider::build(mangakakalot::config())
}

#[cfg(feature = "source-kissmanga")]
pub fn kissmanga() -> Result<Arc<dyn Provider>> {
    provider::build(kissmanga::config())
}

/// Every provider compiled into this build, in a fixed order.
#[allow(unused_mut)]
pub fn registry() -> Result<Providers> {
    let mut providers = Providers::new();
    #[cfg(feature = "source-mangadex")]
    providers.add(mangadex()?);
    #[cfg(feature = "source-mangakakalot")]
    providers.add(mangakakalot()?);
    #[cfg(feature = "source-kissmanga")]
    providers.add(kissmanga()?);
    Ok(providers)
}
