mod common;

use common::TestBackend;
use core::ptr::NonNull;
use corral::{GlobalPageBackend, Pool, PoolError, PoolFlags, PoolInfo};
use std::collections::HashSet;
use std::time::Duration;

fn assert_consistent(info: &PoolInfo) {
    assert_eq!(
        info.nout + info.nitems,
        info.items_per_page * info.npages,
        "every slot must be either allocated or free"
    );
}

#[test]
fn get_put_roundtrip_restores_counters() {
    let pool = Pool::new(
        "rtpl",
        64,
        8,
        0,
        PoolFlags::empty(),
        "rtwt",
        Box::new(GlobalPageBackend::new(4096)),
    );

    let item = pool.get(PoolFlags::empty()).expect("fresh pool");
    let during = pool.info();
    assert_eq!(during.nout, 1);
    assert_consistent(&during);

    unsafe { pool.put(item) };
    let after = pool.info();
    assert_eq!(after.nout, 0);
    assert_eq!(after.nitems, after.items_per_page * after.npages);
    assert_eq!(after.ngets, 1);
    assert_eq!(after.nputs, 1);
    assert_consistent(&after);
}

#[test]
fn items_never_alias() {
    let pool = Pool::new(
        "aliaspl",
        32,
        8,
        0,
        PoolFlags::empty(),
        "aliaswt",
        Box::new(GlobalPageBackend::new(1024)),
    );

    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for _ in 0..200 {
        let item = pool.get(PoolFlags::empty()).expect("unbounded backend");
        assert!(seen.insert(item.as_ptr() as usize), "double allocation");
        items.push(item);
    }
    assert_consistent(&pool.info());
    for item in items {
        unsafe { pool.put(item) };
    }
}

#[test]
fn scenario_64_byte_items_on_two_pages() {
    // 64-byte items on 4 KiB pages with an embedded header: 63 items per
    // page. The backend is capped at two pages, so the pool holds exactly
    // 126 items once primed.
    let backend = TestBackend::new(4096, 2);
    let pool = Pool::new(
        "scenpl",
        64,
        8,
        0,
        PoolFlags::empty(),
        "scenwt",
        Box::new(backend.clone()),
    );
    assert_eq!(pool.items_per_page(), 63);

    pool.prime(100).expect("two pages fit the budget");
    let primed = pool.info();
    assert_eq!(primed.npages, 2);
    assert_eq!(primed.nitems, 126);
    assert_eq!(primed.nout, 0);

    let mut items = Vec::new();
    for _ in 0..126 {
        items.push(pool.get(PoolFlags::empty()).expect("primed item"));
    }

    let failed = pool.get(PoolFlags::empty());
    assert_eq!(failed, Err(PoolError::BackendFailed { pool: "scenpl" }));
    assert_eq!(pool.info().nfails, 1);

    let freed = items.pop().expect("held items");
    let freed_addr = freed.as_ptr();
    unsafe { pool.put(freed) };

    let retried = pool.get(PoolFlags::empty()).expect("one item is free again");
    assert_eq!(retried.as_ptr(), freed_addr, "the just-freed slot is reused");
    items.push(retried);

    for item in items {
        unsafe { pool.put(item) };
    }
    assert_consistent(&pool.info());
}

#[test]
fn hard_limit_boundary() {
    let pool = Pool::new(
        "limitpl",
        64,
        8,
        0,
        PoolFlags::empty(),
        "limitwt",
        Box::new(GlobalPageBackend::new(4096)),
    );
    pool.set_hard_limit(10, Some("limitpl exhausted"), Duration::from_secs(3600));

    let mut items = Vec::new();
    for _ in 0..10 {
        items.push(pool.get(PoolFlags::empty()).expect("within the limit"));
    }

    assert_eq!(
        pool.get(PoolFlags::empty()),
        Err(PoolError::LimitReached {
            pool: "limitpl",
            limit: 10
        })
    );
    let info = pool.info();
    assert_eq!(info.nfails, 1);
    assert_eq!(info.nwarnings, 1);

    // A second failure within the rate-cap interval fails but stays quiet.
    assert!(pool.get(PoolFlags::empty()).is_err());
    let info = pool.info();
    assert_eq!(info.nfails, 2);
    assert_eq!(info.nwarnings, 1);

    // LIMITFAIL turns a would-block get into an immediate failure.
    assert!(pool
        .get(PoolFlags::WAIT | PoolFlags::LIMITFAIL)
        .is_err());

    for item in items {
        unsafe { pool.put(item) };
    }
    assert!(pool.get(PoolFlags::empty()).is_ok_and(|item| {
        unsafe { pool.put(item) };
        true
    }));
}

#[test]
fn reclaim_keeps_minpages_resident() {
    let backend = TestBackend::unlimited(4096);
    let pool = Pool::new(
        "reclpl",
        64,
        8,
        0,
        PoolFlags::empty(),
        "reclwt",
        Box::new(backend.clone()),
    );
    pool.set_low_water(1);

    pool.prime(3 * pool.items_per_page()).expect("three pages");
    assert_eq!(pool.info().npages, 3);
    assert_eq!(pool.info().nidle, 3);

    let released = pool.reclaim();
    assert_eq!(released, 2);
    let info = pool.info();
    assert_eq!(info.npages, 1);
    assert_eq!(backend.freed(), 2);
    assert_consistent(&info);
}

#[test]
fn high_water_bound_releases_idle_pages_eagerly() {
    let backend = TestBackend::unlimited(4096);
    let pool = Pool::new(
        "hiwatpl",
        64,
        8,
        0,
        PoolFlags::empty(),
        "hiwatwt",
        Box::new(backend.clone()),
    );
    let per_page = pool.items_per_page();
    pool.set_high_water(per_page);

    // Spill onto a second page, then free the spilled item: the page goes
    // idle above the bound and is released without an explicit reclaim.
    let mut items = Vec::new();
    for _ in 0..per_page + 1 {
        items.push(pool.get(PoolFlags::empty()).expect("unbounded backend"));
    }
    assert_eq!(pool.info().npages, 2);

    let spilled = items.pop().expect("held items");
    unsafe { pool.put(spilled) };
    assert_eq!(pool.info().npages, 1);
    assert_eq!(backend.freed(), 1);

    for item in items {
        unsafe { pool.put(item) };
    }
    assert_eq!(pool.info().npages, 1);
    assert_consistent(&pool.info());
}

#[test]
fn teardown_returns_every_page_to_the_backend() {
    let backend = TestBackend::unlimited(4096);
    {
        let pool = Pool::new(
            "drainpl",
            128,
            8,
            0,
            PoolFlags::empty(),
            "drainwt",
            Box::new(backend.clone()),
        );
        pool.prime(64).expect("pages");
        let mut items = Vec::new();
        for _ in 0..40 {
            items.push(pool.get(PoolFlags::empty()).expect("primed"));
        }
        for item in items {
            unsafe { pool.put(item) };
        }
    }
    assert_eq!(backend.allocated(), backend.freed(), "no page leaked");
    assert_eq!(backend.live(), 0);
}

#[test]
#[should_panic(expected = "items outstanding")]
fn teardown_with_outstanding_items_panics() {
    let pool = Pool::new(
        "leakpl",
        64,
        8,
        0,
        PoolFlags::empty(),
        "leakwt",
        Box::new(GlobalPageBackend::new(4096)),
    );
    let _leaked = pool.get(PoolFlags::empty()).expect("fresh pool");
    drop(pool);
}

#[test]
#[should_panic(expected = "foreign address")]
fn putting_into_the_wrong_pool_panics() {
    let owner = Pool::new(
        "ownerpl",
        64,
        8,
        0,
        PoolFlags::empty(),
        "ownerwt",
        Box::new(GlobalPageBackend::new(4096)),
    );
    let thief = Pool::new(
        "thiefpl",
        64,
        8,
        0,
        PoolFlags::empty(),
        "thiefwt",
        Box::new(GlobalPageBackend::new(4096)),
    );
    let item = owner.get(PoolFlags::empty()).expect("fresh pool");
    unsafe { thief.put(item) };
}

#[test]
#[should_panic(expected = "not an item address")]
fn putting_an_interior_pointer_panics() {
    let pool = Pool::new(
        "interiorpl",
        64,
        8,
        0,
        PoolFlags::empty(),
        "interiorwt",
        Box::new(GlobalPageBackend::new(4096)),
    );
    let item = pool.get(PoolFlags::empty()).expect("fresh pool");
    let interior = unsafe { NonNull::new_unchecked(item.as_ptr().add(1)) };
    unsafe { pool.put(interior) };
}

#[test]
fn zero_flag_returns_zeroed_memory() {
    let pool = Pool::new(
        "zeropl",
        64,
        8,
        0,
        PoolFlags::empty(),
        "zerowt",
        Box::new(GlobalPageBackend::new(4096)),
    );

    let item = pool.get(PoolFlags::empty()).expect("fresh pool");
    unsafe {
        item.as_ptr().write_bytes(0xab, pool.item_size());
        pool.put(item);
    }

    let zeroed = pool.get(PoolFlags::ZERO).expect("one item free");
    for off in 0..pool.item_size() {
        assert_eq!(unsafe { zeroed.as_ptr().add(off).read() }, 0);
    }
    unsafe { pool.put(zeroed) };
}

#[test]
#[should_panic(expected = "modified while free")]
fn check_flag_catches_writes_to_free_items() {
    let pool = Pool::new(
        "checkpl",
        64,
        8,
        0,
        PoolFlags::CHECK,
        "checkwt",
        Box::new(GlobalPageBackend::new(4096)),
    );

    let item = pool.get(PoolFlags::empty()).expect("fresh pool");
    unsafe {
        pool.put(item);
        // Use after free: scribble over the item while the pool owns it.
        item.as_ptr().add(16).write(0x42);
    }
    let _ = pool.get(PoolFlags::empty());
}

#[test]
#[should_panic(expected = "double free")]
fn check_flag_catches_double_frees() {
    let pool = Pool::new(
        "dfreepl",
        64,
        8,
        0,
        PoolFlags::CHECK,
        "dfreewt",
        Box::new(GlobalPageBackend::new(4096)),
    );

    let item = pool.get(PoolFlags::empty()).expect("fresh pool");
    unsafe {
        pool.put(item);
        pool.put(item);
    }
}

#[test]
fn offpage_pools_work_end_to_end() {
    let backend = TestBackend::unlimited(4096);
    let pool = Pool::new(
        "dmapl",
        64,
        8,
        0,
        PoolFlags::OFFPAGE | PoolFlags::CHECK,
        "dmawt",
        Box::new(backend.clone()),
    );
    // No header reserve: the whole page is items.
    assert_eq!(pool.items_per_page(), 64);

    let mut items = Vec::new();
    for _ in 0..100 {
        items.push(pool.get(PoolFlags::empty()).expect("unbounded backend"));
    }
    assert_consistent(&pool.info());
    for item in items {
        unsafe { pool.put(item) };
    }

    pool.set_low_water(0);
    let released = pool.reclaim();
    assert_eq!(released, 2);
    assert_eq!(pool.info().npages, 0);
}

#[test]
fn large_items_get_detached_headers() {
    // 1024-byte items exceed the embed threshold on 4 KiB pages; the page
    // then splits into exactly four items with no header reserve.
    let pool = Pool::new(
        "bigpl",
        1024,
        8,
        0,
        PoolFlags::empty(),
        "bigwt",
        Box::new(GlobalPageBackend::new(4096)),
    );
    assert_eq!(pool.items_per_page(), 4);

    let items: Vec<_> = (0..4)
        .map(|_| pool.get(PoolFlags::empty()).expect("one page"))
        .collect();
    assert_eq!(pool.info().npages, 1);
    for item in items {
        unsafe { pool.put(item) };
    }
}

#[test]
fn info_snapshot_serializes() {
    let pool = Pool::new(
        "jsonpl",
        64,
        8,
        0,
        PoolFlags::empty(),
        "jsonwt",
        Box::new(GlobalPageBackend::new(4096)),
    );
    pool.set_hard_limit(100, None, Duration::from_secs(1));
    let item = pool.get(PoolFlags::empty()).expect("fresh pool");

    let info = pool.info();
    let json = serde_json::to_string(&info).expect("serialize");
    let parsed: PoolInfo = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(parsed, info);
    assert_eq!(parsed.name, "jsonpl");
    assert_eq!(parsed.hard_limit, 100);
    assert_eq!(parsed.nout, 1);

    unsafe { pool.put(item) };
}

#[test]
fn registry_tracks_pool_lifecycle() {
    let first = Pool::new(
        "regapl",
        64,
        8,
        0,
        PoolFlags::empty(),
        "regawt",
        Box::new(GlobalPageBackend::new(4096)),
    );
    let second = Pool::new(
        "regbpl",
        32,
        8,
        0,
        PoolFlags::empty(),
        "regbwt",
        Box::new(GlobalPageBackend::new(4096)),
    );

    let serials: Vec<u32> = corral::pool_list().iter().map(|info| info.serial).collect();
    assert!(serials.contains(&first.serial()));
    assert!(serials.contains(&second.serial()));
    assert!(first.serial() < second.serial());

    let first_serial = first.serial();
    drop(first);
    let serials: Vec<u32> = corral::pool_list().iter().map(|info| info.serial).collect();
    assert!(!serials.contains(&first_serial));
    assert!(serials.contains(&second.serial()));
}

#[test]
fn reclaim_all_trims_every_live_pool() {
    let backend = TestBackend::unlimited(4096);
    let pool = Pool::new(
        "globpl",
        64,
        8,
        0,
        PoolFlags::empty(),
        "globwt",
        Box::new(backend.clone()),
    );
    pool.set_low_water(1);
    pool.prime(3 * pool.items_per_page()).expect("three pages");

    let released = corral::reclaim_all();
    assert!(released >= 2, "at least this pool's surplus is released");
    assert_eq!(pool.info().npages, 1);
}

#[test]
fn mixed_operations_keep_the_ledger_consistent() {
    let backend = TestBackend::unlimited(1024);
    let pool = Pool::new(
        "mixpl",
        48,
        16,
        0,
        PoolFlags::CHECK,
        "mixwt",
        Box::new(backend.clone()),
    );

    let mut items = Vec::new();
    for round in 0..5 {
        for _ in 0..30 {
            items.push(pool.get(PoolFlags::empty()).expect("unbounded backend"));
        }
        assert_consistent(&pool.info());

        // Free every other item, then reclaim and keep going.
        let mut index = 0;
        items.retain(|&item| {
            index += 1;
            if index % 2 == 0 {
                unsafe { pool.put(item) };
                false
            } else {
                true
            }
        });
        pool.reclaim();
        assert_consistent(&pool.info());
        assert_eq!(pool.info().nout, items.len(), "round {round}");
    }

    for item in items {
        unsafe { pool.put(item) };
    }
    pool.reclaim();
    let info = pool.info();
    assert_eq!(info.nout, 0);
    assert_consistent(&info);
}
