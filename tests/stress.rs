//! Multithreaded stress test: many threads hammer a shared `Memory`
//! instance across every size class and the large path simultaneously,
//! checking only that nothing panics and that the allocator settles back
//! to the minimum reserve once every thread is done and every block freed.

use std::sync::Arc;
use std::thread;

use stratum::config;
use stratum::Memory;

#[test]
fn concurrent_alloc_free_across_classes_settles_back_to_the_reserve() {
    let mem = Arc::new(Memory::new());
    assert!(mem.initialize());

    let threads: Vec<_> = (0..8)
        .map(|t| {
            let mem = Arc::clone(&mem);
            thread::spawn(move || {
                let mut live = Vec::new();
                for round in 0..500 {
                    let size = 1 + (t * 37 + round * 13) % 2048;
                    let p = mem.alloc(size).expect("alloc should not fail under test load");
                    live.push((p, size));

                    if live.len() > 32 {
                        let (victim, _) = live.remove((round * 7) % live.len());
                        mem.free(Some(victim));
                    }
                }
                for (p, _) in live {
                    mem.free(Some(p));
                }
            })
        })
        .collect();

    for t in threads {
        t.join().expect("worker thread should not panic");
    }

    assert_eq!(mem.arena_count(), config::MINIMUM_RESERVE);
    mem.finalize();
}

#[test]
fn concurrent_realloc_does_not_corrupt_other_threads_blocks() {
    let mem = Arc::new(Memory::new());
    mem.initialize();

    let threads: Vec<_> = (0..4)
        .map(|t| {
            let mem = Arc::clone(&mem);
            thread::spawn(move || {
                let mut p = mem.alloc(16).unwrap();
                unsafe { p.as_ptr().write(t as u8) };

                for step in 1..64 {
                    let size = 16 + step * 8;
                    let next = mem.realloc(Some(p), size).unwrap();
                    assert_eq!(unsafe { next.as_ptr().read() }, t as u8);
                    p = next;
                }

                mem.free(Some(p));
            })
        })
        .collect();

    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(mem.arena_count(), config::MINIMUM_RESERVE);
    mem.finalize();
}
