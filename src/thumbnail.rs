use std::path::PathBuf;

use log::{debug, warn};

use crate::{data::Record, source::SourceRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Thumbnail {
    Path(PathBuf),
    Absent,
}

/// Finds a record's thumbnail through the source that produced it.
///
/// Lookup problems are never errors: an unknown shop, a failing lookup and a
/// missing image all come back as [`Thumbnail::Absent`].
pub struct ThumbnailResolver<'a> {
    registry: &'a SourceRegistry,
}

impl<'a> ThumbnailResolver<'a> {
    pub fn new(registry: &'a SourceRegistry) -> Self {
        Self { registry }
    }

    pub fn resolve(&self, record: &Record) -> Thumbnail {
        let Some(source) = self.registry.by_shop(record.shop_name()) else {
            debug!("No source registered for shop '{}'", record.shop_name());
            return Thumbnail::Absent;
        };
        match source.thumbnail_path(record) {
            Ok(Some(path)) => Thumbnail::Path(path),
            Ok(None) => Thumbnail::Absent,
            Err(err) => {
                warn!(
                    "Thumbnail lookup for {} failed, leaving it out: {err:#}",
                    source.name()
                );
                Thumbnail::Absent
            }
        }
    }
}
