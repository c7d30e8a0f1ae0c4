//! Bitstream bundles
//!
//! A bundle is the set of files that make up one bitstream archive: the
//! bitstream, firmware images and the `manifest.json` describing them.
//! Files are addressed by the names the manifest uses.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::manifest::{from_json_slice, BitstreamManifest};

/// Name of the manifest document inside a bundle
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Files of a bitstream archive, by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    files: BTreeMap<String, Vec<u8>>,
}

impl Bundle {
    /// Create an empty bundle
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.insert(name.into(), data.into());
    }

    /// Remove a file, returning its contents
    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        self.files.remove(name)
    }

    /// Contents of a file
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    /// Contents of a file the manifest refers to
    pub fn payload(&self, name: &str) -> Result<&[u8]> {
        self.get(name).ok_or_else(|| Error::MissingPayload {
            filename: name.to_string(),
        })
    }

    /// File names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the bundle has no files
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Parse the bundle's manifest document
    pub fn manifest(&self) -> Result<BitstreamManifest> {
        from_json_slice(self.payload(MANIFEST_FILENAME)?)
    }

    /// Read every regular file of an extracted archive directory
    ///
    /// Subdirectories are ignored, and so are files whose names are not
    /// valid UTF-8 since no manifest can refer to them.
    #[cfg(feature = "std")]
    pub fn from_dir(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let mut bundle = Self::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => {
                    let data = std::fs::read(entry.path())?;
                    log::debug!("Bundle file '{}': {} bytes", name, data.len());
                    bundle.insert(name, data);
                }
                Err(name) => log::warn!("Skipping bundle file {:?}", name),
            }
        }
        log::info!("Loaded {} files from {}", bundle.len(), path.display());
        Ok(bundle)
    }
}

impl<N: Into<String>, D: Into<Vec<u8>>> FromIterator<(N, D)> for Bundle {
    fn from_iter<I: IntoIterator<Item = (N, D)>>(iter: I) -> Self {
        let mut bundle = Self::new();
        for (name, data) in iter {
            bundle.insert(name, data);
        }
        bundle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_missing_payload() {
        let bundle: Bundle = [("top.bit", vec![0u8; 4])].into_iter().collect();
        assert_eq!(bundle.payload("top.bit").unwrap().len(), 4);
        assert_eq!(
            bundle.payload("fw.bin").unwrap_err(),
            Error::MissingPayload {
                filename: "fw.bin".to_string()
            }
        );
        assert!(matches!(
            bundle.manifest().unwrap_err(),
            Error::MissingPayload { .. }
        ));
    }

    #[test]
    fn test_manifest_document() {
        let mut bundle = Bundle::new();
        bundle.insert(
            MANIFEST_FILENAME,
            br#"{"hw_rev":5,"name":"dsp","tag":"v1","regions":[
                {"filename":"top.bit","region_type":"Bitstream","size":1024}]}"#
                .to_vec(),
        );
        let manifest = bundle.manifest().unwrap();
        assert_eq!(manifest.hw_rev, 5);
        assert_eq!(manifest.regions.len(), 1);
        assert_eq!(bundle.names().collect::<Vec<_>>(), [MANIFEST_FILENAME]);
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("top.bit"), [1u8, 2, 3]).unwrap();
        std::fs::write(dir.path().join("fw.bin"), [4u8]).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let bundle = Bundle::from_dir(dir.path()).unwrap();
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.get("top.bit"), Some(&[1u8, 2, 3][..]));
        assert_eq!(bundle.get("nested"), None);
    }
}
