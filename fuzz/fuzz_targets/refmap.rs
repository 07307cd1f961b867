/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

#![no_main]
use gcmap::fuzzing::fuzz_target;
use gcmap::fuzzing::method::FuzzMethod;
use gcmap::{ReferenceMapBuilder, SlotPurpose};

fuzz_target!(|method: FuzzMethod| {
    let _ = env_logger::try_init();
    let m = method.compilation();
    let builder = ReferenceMapBuilder::new(m.arch().abi(), m.frame_layout());

    for (safepoint, info) in m.safepoints().entries() {
        log::trace!("{} at {:#x}", safepoint, info.pc);
        let live: Vec<_> = m.live_values(safepoint).collect();

        // The map depends only on the set of live values.
        let forward = builder.build(live.iter().copied()).expect("well-formed input");
        let backward = builder.build(live.iter().rev().copied()).expect("well-formed input");
        assert_eq!(forward, backward);

        // Incoming parameters never show up in the callee's map.
        let parameters = live.iter().copied().filter(|(_, record)| {
            record
                .location()
                .as_stack()
                .map_or(false, |slot| slot.purpose == SlotPurpose::Parameter)
        });
        assert!(!builder.build(parameters).unwrap().has_references());
    }
});
