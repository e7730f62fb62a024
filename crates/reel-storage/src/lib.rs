//! Local media storage and remote media localization.
//!
//! This crate provides:
//! - [`LocalStorage`]: category directories, collision-free names and
//!   relative/absolute/public path mapping
//! - [`Localizer`]: bounded-timeout downloads, ffprobe inspection and inline
//!   `data:` encoding; it also resolves compositor clip sources
//! - [`UrlCache`]: an explicitly scoped URL → stored file cache

pub mod error;
pub mod local;
pub mod localizer;

pub use error::{StorageError, StorageResult};
pub use local::{LocalStorage, StoredFile, CATEGORY_IMAGES, CATEGORY_MERGED, CATEGORY_VIDEOS};
pub use localizer::{
    decode_data_uri, encode_data_uri, sniff_image_mime, FetchedMedia, Localizer, LocalizerConfig,
    UrlCache, DEFAULT_DOWNLOAD_TIMEOUT,
};
