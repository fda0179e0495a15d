//! Interrupt prioritisation, delivery and exception entry.

use std::sync::Arc;
use std::thread;

use env_logger as _;
use log as _;
use once_cell as _;
use parking_lot as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

use proptest::prelude::*;
use rstest::rstest;
use xtensa_core::{
    presets, sr, Core, CoreError, DeliveryState, ExceptionCause, InterruptType, IrqConfig,
    NullHost, Ps, Variant, Vector, DEBUGCAUSE_BI,
};

/// `sample-mmu` lines per level: (level, irq).
const MASKABLE_LINES: [(u8, u32); 5] = [(1, 0), (2, 8), (3, 9), (4, 12), (5, 19)];
const NMI_IRQ: u32 = 14;
const EDGE_IRQ: u32 = 15;
const SOFTWARE_IRQ: u32 = 7;

fn boot(name: &str) -> Core {
    let mut core = Core::from_variant_name(name, &mut NullHost).expect("built-in variant");
    core.write_sr(sr::PS, 0, &mut NullHost);
    core.arch_mut().set_pc(0x0040_0100);
    core
}

fn enable(core: &mut Core, irqs: &[u32]) {
    let mask = irqs.iter().fold(0, |mask, irq| mask | (1 << irq));
    core.write_sr(sr::INTENABLE, mask, &mut NullHost);
}

#[test]
fn higher_of_two_enabled_levels_is_selected() {
    let mut core = boot(presets::SAMPLE_MMU);
    enable(&mut core, &[9, 19]);
    core.set_irq(9, true).expect("level 3 line");
    core.set_irq(19, true).expect("level 5 line");

    assert_eq!(core.pending_level(), 5);
    assert_eq!(core.delivery_state(), DeliveryState::ExceptionPending);
    assert_eq!(core.on_instruction_boundary(), Ok(true));

    assert_eq!(core.arch().sr(sr::epc(5)), 0x0040_0100);
    assert_eq!(core.arch().sr(sr::eps(5)), 0);
    assert_eq!(core.arch().ps(), Ps::new(0).with_intlevel(5).with_excm(true));
    assert_eq!(core.arch().pc(), 0xD000_0240);
    assert_eq!(core.pending_level(), 0);
    assert_eq!(core.delivery_state(), DeliveryState::ExceptionTaken);
}

#[test]
fn nmi_wins_even_when_disabled_and_masked() {
    let mut core = boot(presets::SAMPLE_MMU);
    enable(&mut core, &[19]);
    core.write_sr(sr::PS, Ps::new(0).with_intlevel(15).raw(), &mut NullHost);
    core.set_irq(19, true).expect("level 5 line");
    core.set_irq(NMI_IRQ, true).expect("nmi line");

    assert_eq!(core.pending_level(), 7);
    assert_eq!(core.on_instruction_boundary(), Ok(true));
    assert_eq!(core.arch().pc(), 0xD000_02C0);
    assert_eq!(core.arch().ps().intlevel(), 7);
    assert_eq!(core.read_sr(sr::INTSET) & (1 << NMI_IRQ), 0);
    assert_ne!(core.read_sr(sr::INTSET) & (1 << 19), 0);
}

#[test]
fn level_one_interrupt_takes_the_exception_path() {
    let mut core = boot(presets::SAMPLE_MMU);
    enable(&mut core, &[0]);
    core.set_irq(0, true).expect("level 1 line");

    assert_eq!(core.on_instruction_boundary(), Ok(true));
    assert_eq!(
        core.arch().sr(sr::EXCCAUSE),
        u32::from(ExceptionCause::Level1Interrupt.as_u8())
    );
    assert_eq!(core.arch().sr(sr::EPC1), 0x0040_0100);
    assert_eq!(core.arch().pc(), 0xD000_0300);
    assert_eq!(core.last_vector(), Some(Vector::Kernel));

    // EXCM lifts the effective level to 3, so the line stays pending.
    assert_eq!(core.pending_level(), 0);
    assert_eq!(core.on_instruction_boundary(), Ok(false));
}

#[test]
fn ineligible_level_is_not_delivered() {
    let mut core = boot(presets::SAMPLE_MMU);
    enable(&mut core, &[9]);
    core.set_irq(9, true).expect("level 3 line");
    core.arch_mut().set_ps(Ps::new(0).with_intlevel(3));

    assert_eq!(core.deliver_pending(), Ok(false));
    assert_eq!(core.arch().pc(), 0x0040_0100);
}

#[rstest]
#[case(presets::SAMPLE_MMU, sr::DEPC)]
#[case(presets::SAMPLE_REGION, sr::EPC1)]
fn double_exception_uses_the_double_save_register(#[case] name: &str, #[case] save: u8) {
    let mut core = boot(name);
    core.raise(ExceptionCause::Syscall).expect("kernel vector");
    let epc1 = core.arch().sr(sr::EPC1);
    core.arch_mut().set_pc(0x0040_0200);

    core.raise(ExceptionCause::LoadStoreAlignment)
        .expect("double vector");

    assert_eq!(core.arch().sr(save), 0x0040_0200);
    if save == sr::DEPC {
        assert_eq!(core.arch().sr(sr::EPC1), epc1);
    }
    assert_eq!(
        core.arch().sr(sr::EXCCAUSE),
        u32::from(ExceptionCause::LoadStoreAlignment.as_u8())
    );
    assert_eq!(core.last_vector(), Some(Vector::Double));
    assert_eq!(core.delivery_state(), DeliveryState::DoubleException);
    let double = core.variant().vector(Vector::Double).expect("double vector");
    assert_eq!(core.arch().pc(), double);
}

/// Six maskable levels with the NMI level one above the highest of them.
fn six_level_core() -> Core {
    let mut config = presets::sample_mmu();
    config.name = "six-level-mmu".into();
    config.nlevel = 6;
    config.level_vectors[7] = None;
    config.interrupts[NMI_IRQ as usize] = IrqConfig::new(6, InterruptType::Level);
    let variant = Arc::new(Variant::finalize(config).expect("valid"));

    let mut core = Core::new(variant, &mut NullHost).expect("core");
    core.write_sr(sr::PS, 0, &mut NullHost);
    core
}

#[rstest]
#[case(0, 6)]
#[case(3, 6)]
#[case(5, 6)]
#[case(6, 0)]
#[case(7, 0)]
#[case(15, 0)]
fn highest_maskable_level_sits_below_the_nmi_level(#[case] intlevel: u32, #[case] expected: u8) {
    let mut core = six_level_core();
    enable(&mut core, &[9, 19, NMI_IRQ]);
    for irq in [9, 19, NMI_IRQ] {
        core.set_irq(irq, true).expect("maskable line");
    }

    core.write_sr(sr::PS, intlevel, &mut NullHost);
    assert_eq!(core.pending_level(), expected);
}

#[rstest]
#[case(0, 5)]
#[case(4, 5)]
#[case(5, 0)]
fn six_level_variant_masks_lower_lines_by_intlevel(#[case] intlevel: u32, #[case] expected: u8) {
    let mut core = six_level_core();
    enable(&mut core, &[9, 19]);
    core.set_irq(9, true).expect("level 3 line");
    core.set_irq(19, true).expect("level 5 line");

    core.write_sr(sr::PS, intlevel, &mut NullHost);
    assert_eq!(core.pending_level(), expected);
}

#[test]
fn user_mode_takes_the_user_vector() {
    let mut core = boot(presets::SAMPLE_MPU);
    core.write_sr(sr::PS, Ps::new(0).with_um(true).raw(), &mut NullHost);

    core.alignment_fault(0x0000_1001).expect("user vector");
    assert_eq!(core.last_vector(), Some(Vector::User));
    assert_eq!(core.arch().pc(), 0x6000_0340);
    assert_eq!(core.arch().sr(sr::EXCVADDR), 0x0000_1001);
    assert!(core.arch().ps().excm());
}

#[test]
fn vectors_follow_a_moved_vecbase() {
    let mut core = boot(presets::SAMPLE_MMU);
    core.write_sr(sr::VECBASE, 0x0010_0000, &mut NullHost);

    core.raise(ExceptionCause::IllegalInstruction)
        .expect("kernel vector");
    assert_eq!(core.arch().pc(), 0x0010_0300);
}

#[test]
fn debug_exception_preempts_exception_mode() {
    let mut core = boot(presets::SAMPLE_MMU);
    core.write_sr(sr::PS, Ps::new(0).with_excm(true).raw(), &mut NullHost);

    assert_eq!(core.debug_exception(DEBUGCAUSE_BI), Ok(true));
    assert_eq!(core.arch().sr(sr::DEBUGCAUSE), DEBUGCAUSE_BI);
    assert_eq!(core.arch().sr(sr::epc(6)), 0x0040_0100);
    assert_eq!(core.arch().sr(sr::eps(6)), 0x10);
    assert_eq!(core.arch().ps().intlevel(), 6);
    assert_eq!(core.arch().pc(), 0xD000_0280);
    assert_eq!(core.last_vector(), Some(Vector::Debug));

    assert_eq!(core.debug_exception(DEBUGCAUSE_BI), Ok(false));
}

#[test]
fn line_types_decide_what_a_deassert_does() {
    let mut core = boot(presets::SAMPLE_MMU);
    core.set_irq(0, true).expect("level line");
    core.set_irq(EDGE_IRQ, true).expect("edge line");
    core.set_irq(0, false).expect("level line");
    core.set_irq(EDGE_IRQ, false).expect("edge line");
    assert_eq!(core.read_sr(sr::INTSET), 1 << EDGE_IRQ);

    core.write_sr(sr::INTCLEAR, u32::MAX, &mut NullHost);
    assert_eq!(core.read_sr(sr::INTSET), 0);

    assert_eq!(core.set_irq(20, true), Err(CoreError::UnknownIrq(20)));
}

#[test]
fn software_interrupts_are_raised_through_intset() {
    let mut core = boot(presets::SAMPLE_MMU);
    enable(&mut core, &[SOFTWARE_IRQ]);
    core.write_sr(sr::INTSET, u32::MAX, &mut NullHost);

    assert_eq!(core.read_sr(sr::INTSET), (1 << SOFTWARE_IRQ) | (1 << 11));
    assert_eq!(core.pending_level(), 1);
}

#[test]
fn timer_match_latches_until_ccompare_is_written() {
    let mut core = boot(presets::SAMPLE_MMU);
    enable(&mut core, &[10]);

    core.ccompare_match(1);
    assert_eq!(core.pending_level(), 3);
    core.ccompare_match(7);

    core.write_sr(sr::CCOMPARE + 1, 0x1000, &mut NullHost);
    assert_eq!(core.pending_level(), 0);
    assert_eq!(core.read_sr(sr::INTSET), 0);
}

#[test]
fn handle_assertions_are_picked_up_at_the_boundary() {
    let mut core = boot(presets::SAMPLE_MMU);
    enable(&mut core, &[12]);
    let handle = core.irq_handle();

    let worker = {
        let handle = handle.clone();
        thread::spawn(move || handle.set_irq(12, true))
    };
    worker.join().expect("worker thread").expect("level 4 line");

    assert_eq!(handle.pending(), 1 << 12);
    assert_eq!(core.pending_level(), 0);
    assert_eq!(core.on_instruction_boundary(), Ok(true));
    assert_eq!(core.arch().ps().intlevel(), 4);
    assert_eq!(core.arch().sr(sr::epc(4)), 0x0040_0100);
}

#[test]
fn missing_level_vector_is_fatal() {
    let mut config = presets::sample_region();
    config.name = "region-without-level-2".into();
    config.level_vectors[2] = None;
    let variant = Arc::new(Variant::finalize(config).expect("valid"));
    let mut core = Core::new(variant, &mut NullHost).expect("core");
    core.write_sr(sr::PS, 0, &mut NullHost);
    core.write_sr(sr::INTENABLE, 1 << 6, &mut NullHost);
    core.set_irq(6, true).expect("level 2 line");

    assert_eq!(core.on_instruction_boundary(), Err(CoreError::UnsetLevelVector(2)));
}

proptest! {
    #[test]
    fn highest_enabled_level_always_wins(a in 0_usize..5, b in 0_usize..5, intlevel in 0_u8..6) {
        prop_assume!(a != b);
        let mut core = boot(presets::SAMPLE_MMU);
        let (level_a, irq_a) = MASKABLE_LINES[a];
        let (level_b, irq_b) = MASKABLE_LINES[b];
        enable(&mut core, &[irq_a, irq_b]);
        core.write_sr(sr::PS, Ps::new(0).with_intlevel(intlevel).raw(), &mut NullHost);
        core.set_irq(irq_a, true).expect("line a");
        core.set_irq(irq_b, true).expect("line b");

        let highest = level_a.max(level_b);
        let expected = if highest > intlevel { highest } else { 0 };
        prop_assert_eq!(core.pending_level(), expected);
    }
}
