#![no_main]

use libfuzzer_sys::fuzz_target;
use xtensa_core::{
    presets, sr, AccessKind, BusError, Core, HostMapping, HostMemory, NullHost,
};

/// Physical memory that answers every word read with its own address.
struct MirrorMemory;

impl HostMemory for MirrorMemory {
    fn read_physical_word(&mut self, paddr: u32) -> Result<u32, BusError> {
        Ok(paddr | 0x3)
    }

    fn install_translation(&mut self, _mapping: HostMapping) {}

    fn invalidate(&mut self, _vaddr: u32) {}

    fn invalidate_all(&mut self) {}
}

const VARIANTS: [&str; 5] = [
    presets::SAMPLE_MMU,
    presets::SAMPLE_MMU_VARWAY56,
    presets::SAMPLE_REGION,
    presets::SAMPLE_MPU,
    presets::SAMPLE_FLAT,
];

fn word(data: &[u8], at: usize) -> u32 {
    let mut bytes = [0_u8; 4];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = data.get(at + i).copied().unwrap_or(0);
    }
    u32::from_le_bytes(bytes)
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 13 {
        return;
    }
    let name = VARIANTS[usize::from(data[0]) % VARIANTS.len()];
    let Ok(mut core) = Core::from_variant_name(name, &mut NullHost) else {
        return;
    };
    let mut host = MirrorMemory;
    core.write_sr(sr::PS, 0, &mut host);
    core.write_sr(sr::CACHEATTR, word(data, 1), &mut host);
    core.write_sr(sr::PTEVADDR, word(data, 5), &mut host);

    for chunk in data[9..].chunks(9) {
        let vaddr = word(chunk, 1);
        let value = word(chunk, 5);
        match chunk[0] % 6 {
            0 => {
                core.wtlb(value, vaddr, chunk[0] & 0x80 != 0, &mut host);
            }
            1 => core.wptlb(value, vaddr, &mut host),
            2 => {
                let _ = core.ptlb(vaddr, chunk[0] & 0x80 != 0);
                let _ = core.pptlb(vaddr);
            }
            3 => {
                let ring = (chunk[0] >> 4) & 0x3;
                let kind = [AccessKind::Load, AccessKind::Store, AccessKind::Fetch]
                    [usize::from(chunk[0] >> 6) % 3];
                let before = core.translate(false, vaddr, kind, ring, &mut host);
                let again = core.translate(false, vaddr, kind, ring, &mut host);
                assert_eq!(before, again);
            }
            4 => {
                let _ = core.probe_translate(vaddr, &mut host);
            }
            _ => core.write_sr(sr::RASID, value, &mut host),
        }
    }
});
