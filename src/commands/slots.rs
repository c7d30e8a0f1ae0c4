//! Slots command implementation

use tiliqua_flash_core::layout::{SlotLayout, N_MANIFESTS};

/// Print the address map of the bootloader region and every slot
pub fn run_slots() {
    println!(
        "{:<10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "region", "bitstream", "firmware", "options", "manifest", "end"
    );
    let layouts = std::iter::once(SlotLayout::bootloader())
        .chain((0..N_MANIFESTS).filter_map(|n| SlotLayout::slot(n).ok()));
    for layout in layouts {
        let name = match layout.slot_number() {
            Some(n) => format!("slot {}", n),
            None => "bootloader".to_string(),
        };
        let firmware = match layout.firmware_base() {
            Some(addr) => format!("0x{:06x}", addr),
            None => "(XiP)".to_string(),
        };
        println!(
            "{:<10} {:>10} {:>10} {:>10} {:>10} {:>10}",
            name,
            format!("0x{:06x}", layout.bitstream_addr()),
            firmware,
            format!("0x{:06x}", layout.options_base()),
            format!("0x{:06x}", layout.manifest_addr()),
            format!("0x{:06x}", layout.slot_end_addr()),
        );
    }
}
