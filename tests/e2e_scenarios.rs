//! End-to-end scenarios against the public `Memory` façade, mirroring the
//! literal walkthroughs of the allocator's behavior at default
//! configuration (page size 4096, quantum 8, arena size 262144, 128
//! classes, minimum reserve 16, shrink threshold 10).

use stratum::config;
use stratum::Memory;

#[test]
fn initialize_yields_the_minimum_reserve_with_every_arena_empty() {
    let mem = Memory::new();
    assert!(mem.initialize());
    assert_eq!(mem.arena_count(), config::MINIMUM_RESERVE);
    mem.finalize();
}

#[test]
fn a_single_small_alloc_and_free_restores_the_arena_count() {
    let mem = Memory::new();
    mem.initialize();

    let p = mem.alloc(24).unwrap(); // class 2, block size 24
    assert_eq!(p.as_ptr() as usize % config::QUANTUM, 0);

    mem.free(Some(p));
    assert_eq!(mem.arena_count(), config::MINIMUM_RESERVE);

    mem.finalize();
}

#[test]
fn overflowing_one_pool_carves_a_second_and_draining_both_restores_the_reserve() {
    let mem = Memory::new();
    mem.initialize();

    // A 4 KiB page can house at most PAGE_SIZE / 24 class-2 blocks, so this
    // comfortably spans at least two pool carves.
    let count = config::PAGE_SIZE / 24 + 16;

    let mut live = Vec::new();
    for _ in 0..count {
        live.push(mem.alloc(24).unwrap());
    }

    for p in live {
        mem.free(Some(p));
    }
    assert_eq!(mem.arena_count(), config::MINIMUM_RESERVE);

    mem.finalize();
}

#[test]
fn growing_past_the_reserve_and_draining_releases_the_extra_arena() {
    let mem = Memory::new();
    mem.initialize();

    // One pool per distinct class per arena round, forcing every reserve
    // arena to be fully carved and a 17th arena to be mapped.
    let mut live = Vec::new();
    for _ in 0..=config::MINIMUM_RESERVE {
        for class in 0..config::POOL_CAPACITY.min(config::CLASSES) {
            live.push(mem.alloc(config::class_to_size(class)).unwrap());
        }
    }
    assert!(mem.arena_count() > config::MINIMUM_RESERVE);

    for p in live {
        mem.free(Some(p));
    }
    assert_eq!(mem.arena_count(), config::MINIMUM_RESERVE);

    mem.finalize();
}

#[test]
fn realloc_walks_through_a_no_op_shrink_then_a_real_shrink() {
    let mem = Memory::new();
    mem.initialize();

    let p = mem.alloc(100).unwrap(); // class 12
    let q = mem.realloc(Some(p), 96).unwrap(); // class 12, gap 0 < 10
    assert_eq!(p, q);

    let r = mem.realloc(Some(q), 16).unwrap(); // class 1, gap 11 >= 10
    assert_ne!(r, q);

    mem.free(Some(r));
    mem.finalize();
}

#[test]
fn a_large_allocation_records_its_size_in_the_prefix_header() {
    let mem = Memory::new();
    mem.initialize();

    let big = mem.alloc(10_000).unwrap();
    assert_eq!(big.as_ptr() as usize % config::QUANTUM, 0);

    let grown_in_place = mem.realloc(Some(big), 9_000).unwrap();
    assert_eq!(big, grown_in_place, "shrinking with slack should not reallocate");

    mem.free(Some(grown_in_place));
    mem.finalize();
}

#[test]
fn boundary_classes_match_the_documented_table() {
    let mem = Memory::new();
    mem.initialize();

    let one = mem.alloc(1).unwrap();
    let eight = mem.alloc(8).unwrap();
    let same_page = |a: std::ptr::NonNull<u8>, b: std::ptr::NonNull<u8>| {
        (a.as_ptr() as usize & !(config::PAGE_SIZE - 1))
            == (b.as_ptr() as usize & !(config::PAGE_SIZE - 1))
    };
    assert!(same_page(one, eight), "size 1 and size 8 are both class 0");

    let at_max = mem.alloc(1024).unwrap();
    let over_max = mem.alloc(1025).unwrap();
    assert!(!same_page(at_max, over_max), "1025 takes the large path, not a pool page");

    mem.free(Some(one));
    mem.free(Some(eight));
    mem.free(Some(at_max));
    mem.free(Some(over_max));
    mem.finalize();
}

#[test]
fn calloc_rejects_either_zero_argument_and_zero_fills_otherwise() {
    let mem = Memory::new();
    mem.initialize();

    assert!(mem.calloc(0, 16).is_none());
    assert!(mem.calloc(16, 0).is_none());

    let p = mem.calloc(8, 8).unwrap();
    unsafe {
        for i in 0..64 {
            assert_eq!(p.as_ptr().add(i).read(), 0);
        }
    }
    mem.free(Some(p));
    mem.finalize();
}
