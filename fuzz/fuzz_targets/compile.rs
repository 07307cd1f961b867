/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

#![no_main]
use gcmap::fuzzing::fuzz_target;
use gcmap::fuzzing::method::FuzzMethod;

fuzz_target!(|method: FuzzMethod| {
    let _ = env_logger::try_init();
    let m = method.into_compilation();
    let pcs: Vec<u32> = m.safepoints().iter().map(|info| info.pc).collect();
    let compiled = m.finish().expect("checker and builder accept well-formed input");
    log::trace!("{}", compiled);

    let maps = compiled.reference_maps();
    assert_eq!(maps.len(), pcs.len());
    for pc in pcs {
        assert!(maps.lookup(pc).is_some());
    }
});
