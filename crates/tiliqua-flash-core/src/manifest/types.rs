//! Manifest types
//!
//! Bounded representation of a bitstream manifest. Strings and lists use
//! `heapless` containers sized from the manifest constants, so a value of
//! these types always fits the encoding the bootloader reads. Every
//! constructor checks lengths up front and reports the offending field.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;
use core::ops::Range;

use log::info;
use serde::{Deserialize, Serialize};

use super::{
    BITSTREAM_NAME_LEN, BITSTREAM_TAG_LEN, HELP_BRIEF_MAX_SIZE, HELP_IO_LEFT_N, HELP_IO_MAX_SIZE,
    HELP_IO_RIGHT_N, HELP_VIDEO_MAX_SIZE, MANIFEST_MAGIC, REGION_FILE_LEN, REGION_MAX_N,
};
use crate::error::{Error, Result, SchemaViolation};

/// Kind of a memory region
///
/// The variant names are the wire tokens and must not change.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegionType {
    /// Bitstream region that gets loaded directly by the bootloader
    Bitstream,
    /// XiP firmware that executes directly from SPI flash
    XipFirmware,
    /// Region that gets copied from SPI flash to RAM before use
    RamLoad,
    /// Option storage region for persistent application settings
    OptionStorage,
    /// Manifest region containing metadata about the bitstream
    Manifest,
}

impl RegionType {
    /// Wire token for this region kind
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bitstream => "Bitstream",
            Self::XipFirmware => "XipFirmware",
            Self::RamLoad => "RamLoad",
            Self::OptionStorage => "OptionStorage",
            Self::Manifest => "Manifest",
        }
    }
}

impl fmt::Display for RegionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Copy `value` into a bounded string, or report `field` as too long
fn bounded<const N: usize>(field: &str, value: &str) -> Result<heapless::String<N>> {
    let mut out = heapless::String::new();
    out.push_str(value).map_err(|_| SchemaViolation::TooLong {
        field: field.to_string(),
        len: value.len(),
        max: N,
    })?;
    Ok(out)
}

/// Copy a list of labels into a fixed-size array of bounded strings
fn labels<const N: usize, S: AsRef<str>>(
    field: &str,
    values: &[S],
) -> Result<[heapless::String<HELP_IO_MAX_SIZE>; N]> {
    if values.len() != N {
        return Err(SchemaViolation::WrongCount {
            field: field.to_string(),
            len: values.len(),
            expected: N,
        }
        .into());
    }
    let mut out: [heapless::String<HELP_IO_MAX_SIZE>; N] =
        core::array::from_fn(|_| heapless::String::new());
    for (i, (label, value)) in out.iter_mut().zip(values).enumerate() {
        *label = bounded(&format!("{}[{}]", field, i), value.as_ref())?;
    }
    Ok(out)
}

/// A memory region described by a manifest
///
/// `spiflash_src` is unset for regions whose flash address is chosen at
/// flash time; see [`crate::layout::resolve`].
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct MemoryRegion {
    /// Bundle file holding the region contents, absent for virtual regions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<heapless::String<REGION_FILE_LEN>>,
    /// Region kind
    pub region_type: RegionType,
    /// Address of the region in SPI flash
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spiflash_src: Option<u32>,
    /// Address the bootloader copies the region to (`RamLoad` only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psram_dst: Option<u32>,
    /// Size in bytes
    pub size: u32,
    /// Checksum of the region contents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crc: Option<u32>,
}

impl MemoryRegion {
    /// Create a region backed by a bundle file
    pub fn new(filename: &str, region_type: RegionType, size: u32) -> Result<Self> {
        Ok(Self {
            filename: Some(bounded("filename", filename)?),
            ..Self::without_file(region_type, size)
        })
    }

    /// Create a region with no backing file
    pub fn without_file(region_type: RegionType, size: u32) -> Self {
        Self {
            filename: None,
            region_type,
            spiflash_src: None,
            psram_dst: None,
            size,
            crc: None,
        }
    }

    /// Set the flash address
    pub fn with_spiflash_src(mut self, addr: u32) -> Self {
        self.spiflash_src = Some(addr);
        self
    }

    /// Set the RAM destination address
    pub fn with_psram_dst(mut self, addr: u32) -> Self {
        self.psram_dst = Some(addr);
        self
    }

    /// Set the checksum
    pub fn with_crc(mut self, crc: u32) -> Self {
        self.crc = Some(crc);
        self
    }

    /// Name used in logs and errors: the file name, or the region kind
    pub fn name(&self) -> &str {
        self.filename
            .as_deref()
            .unwrap_or(self.region_type.as_str())
    }
}

/// External PLL settings applied by the bootloader
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExternalPllConfig {
    /// Frequency of clock output 0
    pub clk0_hz: u32,
    /// Frequency of clock output 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clk1_hz: Option<u32>,
    /// Whether clock output 1 follows output 0
    pub clk1_inherit: bool,
    /// Spread spectrum amount
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spread_spectrum: Option<f32>,
}

/// Short description shown by the bootloader before switching bitstreams
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct BitstreamHelp {
    /// One-line summary
    pub brief: heapless::String<HELP_BRIEF_MAX_SIZE>,
    /// Video mode description
    pub video: heapless::String<HELP_VIDEO_MAX_SIZE>,
    /// Labels for the audio/CV jacks
    pub io_left: [heapless::String<HELP_IO_MAX_SIZE>; HELP_IO_LEFT_N],
    /// Labels for the connectors on the right
    pub io_right: [heapless::String<HELP_IO_MAX_SIZE>; HELP_IO_RIGHT_N],
}

impl BitstreamHelp {
    /// Create a help block, checking every label
    pub fn new<S: AsRef<str>>(
        brief: &str,
        video: &str,
        io_left: &[S],
        io_right: &[S],
    ) -> Result<Self> {
        Ok(Self {
            brief: bounded("help.brief", brief)?,
            video: bounded("help.video", video)?,
            io_left: labels("help.io_left", io_left)?,
            io_right: labels("help.io_right", io_right)?,
        })
    }
}

/// Manifest describing one bitstream and its memory regions
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(try_from = "ManifestDocument")]
pub struct BitstreamManifest {
    /// Hardware revision the bitstream was built for
    pub hw_rev: u32,
    /// Bitstream name
    pub name: heapless::String<BITSTREAM_NAME_LEN>,
    /// Bitstream tag (usually a short git revision)
    pub tag: heapless::String<BITSTREAM_TAG_LEN>,
    /// Memory regions, in archive order
    pub regions: heapless::Vec<MemoryRegion, REGION_MAX_N>,
    /// Help block shown by the bootloader
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<BitstreamHelp>,
    /// External PLL configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_pll_config: Option<ExternalPllConfig>,
    /// Always [`MANIFEST_MAGIC`]
    pub magic: u32,
}

impl BitstreamManifest {
    /// Create a manifest, checking all bounded fields and region kinds
    pub fn new(
        hw_rev: u32,
        name: &str,
        tag: &str,
        regions: impl IntoIterator<Item = MemoryRegion>,
    ) -> Result<Self> {
        let name = bounded("name", name)?;
        let tag = bounded("tag", tag)?;
        let regions: Vec<MemoryRegion> = regions.into_iter().collect();
        let too_many = || SchemaViolation::TooLong {
            field: "regions".to_string(),
            len: regions.len(),
            max: REGION_MAX_N,
        };
        if regions.len() > REGION_MAX_N {
            return Err(too_many().into());
        }
        check_region_kinds(&regions)?;
        let regions = heapless::Vec::from_slice(&regions).map_err(|_| too_many())?;

        Ok(Self {
            hw_rev,
            name,
            tag,
            regions,
            help: None,
            external_pll_config: None,
            magic: MANIFEST_MAGIC,
        })
    }

    /// Attach a help block
    pub fn with_help(mut self, help: BitstreamHelp) -> Self {
        self.help = Some(help);
        self
    }

    /// Attach an external PLL configuration
    pub fn with_external_pll_config(mut self, config: ExternalPllConfig) -> Self {
        self.external_pll_config = Some(config);
        self
    }

    /// Whether this manifest executes firmware in place (bootloader bundles)
    pub fn is_xip(&self) -> bool {
        self.find_region(RegionType::XipFirmware).is_some()
    }

    /// Flash address of the first XiP firmware region, if fixed
    pub fn xip_offset(&self) -> Option<u32> {
        self.find_region(RegionType::XipFirmware)
            .and_then(|r| r.spiflash_src)
    }

    /// First region of the given kind
    pub fn find_region(&self, region_type: RegionType) -> Option<&MemoryRegion> {
        self.regions.iter().find(|r| r.region_type == region_type)
    }

    /// Flash window of the option storage region, once it has an address
    pub fn option_storage_window(&self) -> Option<Range<u32>> {
        self.regions
            .iter()
            .filter(|r| r.region_type == RegionType::OptionStorage)
            .find_map(|r| r.spiflash_src.map(|src| src..src.saturating_add(r.size)))
    }

    /// Log the manifest contents
    pub fn print(&self) {
        info!("BitstreamManifest {{");
        info!("\tmagic:    {:#x}", self.magic);
        info!("\thw_rev:   {}", self.hw_rev);
        info!("\tname:    '{}'", self.name);
        info!("\ttag:     '{}'", self.tag);
        if let Some(help) = &self.help {
            info!("\thelp = {{");
            info!("\t\tbrief:   '{}'", help.brief);
            info!("\t\tvideo:   '{}'", help.video);
            info!("\t}}");
        }
        if let Some(clocks) = &self.external_pll_config {
            info!("\texternal_pll_config = {{");
            info!("\t\tclk0_hz: {}", clocks.clk0_hz);
            info!("\t\tclk1_hz: {:?}", clocks.clk1_hz);
            info!("\t\tclk1_inherit: {:?}", clocks.clk1_inherit);
            info!("\t\tspread_spectrum: {:?}", clocks.spread_spectrum);
            info!("\t}}");
        }
        for (i, region) in self.regions.iter().enumerate() {
            info!("\tmemory_region[{}] = {{", i);
            info!("\t\tfilename:     '{}'", region.name());
            info!("\t\tregion_type:  {}", region.region_type);
            match region.spiflash_src {
                Some(src) => info!("\t\tspiflash_src: {:#x}", src),
                None => info!("\t\tspiflash_src: None"),
            }
            if let Some(psram_dst) = region.psram_dst {
                info!("\t\tpsram_dst:    {:#x} (copyto)", psram_dst);
            }
            info!("\t\tsize:         {:#x}", region.size);
            if let Some(crc) = region.crc {
                info!("\t\tcrc:          {:#x}", crc);
            }
            info!("\t}}");
        }
        info!("}}");
    }
}

/// Check which region kinds may appear together
///
/// A manifest has at most one bitstream and one manifest region, and is
/// either XiP or RAM-loaded, never both. `psram_dst` is set on exactly the
/// `RamLoad` regions.
pub fn check_region_kinds(regions: &[MemoryRegion]) -> Result<()> {
    let count = |kind| regions.iter().filter(|r| r.region_type == kind).count();

    for kind in [RegionType::Bitstream, RegionType::Manifest] {
        if count(kind) > 1 {
            return Err(SchemaViolation::DuplicateRegion(kind).into());
        }
    }
    if count(RegionType::XipFirmware) > 0 && count(RegionType::RamLoad) > 0 {
        return Err(
            SchemaViolation::ConflictingRegions(RegionType::XipFirmware, RegionType::RamLoad)
                .into(),
        );
    }
    for (i, region) in regions.iter().enumerate() {
        let field = || format!("regions[{}].psram_dst", i);
        let region_type = region.region_type;
        match (region_type, region.psram_dst) {
            (RegionType::RamLoad, None) => {
                return Err(SchemaViolation::MissingField {
                    field: field(),
                    region_type,
                }
                .into())
            }
            (RegionType::RamLoad, Some(_)) | (_, None) => {}
            (_, Some(_)) => {
                return Err(SchemaViolation::UnexpectedField {
                    field: field(),
                    region_type,
                }
                .into())
            }
        }
    }
    Ok(())
}

/// Check that a manifest has everything needed to flash it
///
/// On top of [`check_region_kinds`], a flashable manifest has exactly one
/// bitstream and exactly one manifest region.
pub fn check_required_regions(regions: &[MemoryRegion]) -> Result<()> {
    check_region_kinds(regions)?;
    for kind in [RegionType::Bitstream, RegionType::Manifest] {
        if !regions.iter().any(|r| r.region_type == kind) {
            return Err(SchemaViolation::MissingRegion(kind).into());
        }
    }
    Ok(())
}

fn default_magic() -> u32 {
    MANIFEST_MAGIC
}

/// Unbounded manifest as it appears in a JSON document
#[derive(Deserialize)]
pub(crate) struct ManifestDocument {
    hw_rev: u32,
    name: String,
    tag: String,
    regions: Vec<RegionDocument>,
    #[serde(default)]
    help: Option<HelpDocument>,
    #[serde(default)]
    external_pll_config: Option<ExternalPllConfig>,
    #[serde(default = "default_magic")]
    magic: u32,
}

#[derive(Deserialize)]
struct RegionDocument {
    #[serde(default)]
    filename: Option<String>,
    region_type: RegionType,
    #[serde(default)]
    spiflash_src: Option<u32>,
    #[serde(default)]
    psram_dst: Option<u32>,
    size: u32,
    #[serde(default)]
    crc: Option<u32>,
}

#[derive(Deserialize)]
struct HelpDocument {
    brief: String,
    video: String,
    io_left: Vec<String>,
    io_right: Vec<String>,
}

impl RegionDocument {
    fn into_region(self, index: usize) -> Result<MemoryRegion> {
        let filename = match self.filename {
            Some(name) => Some(bounded(&format!("regions[{}].filename", index), &name)?),
            None => None,
        };
        Ok(MemoryRegion {
            filename,
            region_type: self.region_type,
            spiflash_src: self.spiflash_src,
            psram_dst: self.psram_dst,
            size: self.size,
            crc: self.crc,
        })
    }
}

impl TryFrom<ManifestDocument> for BitstreamManifest {
    type Error = Error;

    fn try_from(doc: ManifestDocument) -> Result<Self> {
        let regions = doc
            .regions
            .into_iter()
            .enumerate()
            .map(|(i, region)| region.into_region(i))
            .collect::<Result<Vec<_>>>()?;

        let mut manifest = BitstreamManifest::new(doc.hw_rev, &doc.name, &doc.tag, regions)?;
        if let Some(help) = doc.help {
            manifest.help = Some(BitstreamHelp::new(
                &help.brief,
                &help.video,
                &help.io_left,
                &help.io_right,
            )?);
        }
        manifest.external_pll_config = doc.external_pll_config;
        manifest.magic = doc.magic;
        Ok(manifest)
    }
}
