use crate::error::Violation;
use crate::ring::{XdpDesc, local_pair, local_pair_at};

#[test]
fn test_reserve_submit_peek_release() {
    let (mut prod, mut cons) = local_pair::<u64>(8).unwrap();
    assert_eq!(prod.capacity(), 8);

    let (n, start) = prod.reserve(3);
    assert_eq!(n, 3);
    for i in 0..n {
        prod.write(start.wrapping_add(i), 100 + i as u64).unwrap();
    }
    // nothing is visible before submit
    assert_eq!(cons.peek(8).0, 0);
    prod.submit(3).unwrap();

    let (n, start) = cons.peek(8);
    assert_eq!(n, 3);
    let values: Vec<u64> = (0..n)
        .map(|i| cons.read(start.wrapping_add(i)).unwrap())
        .collect();
    assert_eq!(values, vec![100, 101, 102]);
    cons.release(n).unwrap();
    assert_eq!(prod.free(), 8);
}

#[test]
fn test_partial_reserve_on_full_ring() {
    let (mut prod, mut cons) = local_pair::<u64>(4).unwrap();
    assert_eq!(prod.reserve(3).0, 3);
    // only one slot left: a partial grant, not an error
    assert_eq!(prod.reserve(3).0, 1);
    assert_eq!(prod.reserve(1).0, 0);
    prod.submit(4).unwrap();

    let (n, _) = cons.peek(2);
    cons.release(n).unwrap();
    assert_eq!(prod.reserve(4).0, 2);
}

#[test]
fn test_submit_more_than_reserved() {
    let (mut prod, _cons) = local_pair::<XdpDesc>(8).unwrap();
    assert_eq!(prod.reserve(3).0, 3);
    assert_eq!(
        prod.submit(5),
        Err(Violation::SubmitOverflow {
            requested: 5,
            reserved: 3
        })
    );
    // the ring is untouched by the rejected submit
    assert_eq!(prod.reserved(), 3);
    prod.submit(3).unwrap();
}

#[test]
fn test_release_more_than_peeked() {
    let (mut prod, mut cons) = local_pair::<u64>(8).unwrap();
    prod.reserve(2);
    prod.submit(2).unwrap();
    assert_eq!(cons.peek(1).0, 1);
    assert_eq!(
        cons.release(2),
        Err(Violation::ReleaseOverflow {
            requested: 2,
            peeked: 1
        })
    );
}

#[test]
fn test_write_outside_window() {
    let (mut prod, mut cons) = local_pair::<u64>(8).unwrap();
    let (_, start) = prod.reserve(2);
    assert!(prod.write(start.wrapping_add(2), 7).is_err());
    prod.write(start, 1).unwrap();
    prod.write(start.wrapping_add(1), 2).unwrap();
    prod.submit(2).unwrap();
    // submitted slots belong to the consumer now
    assert!(prod.write(start, 9).is_err());

    let (_, start) = cons.peek(1);
    assert!(cons.read(start.wrapping_add(1)).is_err());
}

#[test]
fn test_cancel() {
    let (mut prod, mut cons) = local_pair::<u64>(8).unwrap();
    let (_, start) = prod.reserve(4);
    prod.cancel(2).unwrap();
    assert_eq!(prod.reserved(), 2);
    assert!(prod.cancel(3).is_err());
    prod.write(start, 1).unwrap();
    prod.write(start.wrapping_add(1), 2).unwrap();
    prod.submit(2).unwrap();

    let (n, start) = cons.peek(2);
    assert_eq!(n, 2);
    cons.cancel(1).unwrap();
    assert_eq!(cons.peeked(), 1);
    let (n, again) = cons.peek(1);
    assert_eq!((n, again), (1, start.wrapping_add(1)));
    assert_eq!(cons.read(again).unwrap(), 2);
}

#[test]
fn test_peek_continues_after_peeked_window() {
    let (mut prod, mut cons) = local_pair::<u64>(8).unwrap();
    let (_, start) = prod.reserve(4);
    for i in 0..4 {
        prod.write(start.wrapping_add(i), i as u64).unwrap();
    }
    prod.submit(4).unwrap();
    let (_, first) = cons.peek(2);
    let (n, second) = cons.peek(8);
    assert_eq!(n, 2);
    assert_eq!(second, first.wrapping_add(2));
    assert_eq!(cons.read(second).unwrap(), 2);
    cons.release(4).unwrap();
}

#[test]
fn test_indices_wrap() {
    let (mut prod, mut cons) = local_pair_at::<u64>(4, u32::MAX - 1).unwrap();
    for round in 0..4u64 {
        let (n, start) = prod.reserve(3);
        assert_eq!(n, 3);
        for i in 0..n {
            prod.write(start.wrapping_add(i), round * 10 + i as u64).unwrap();
        }
        prod.submit(n).unwrap();
        let (n, start) = cons.peek(4);
        assert_eq!(n, 3);
        for i in 0..n {
            assert_eq!(cons.read(start.wrapping_add(i)).unwrap(), round * 10 + i as u64);
        }
        cons.release(n).unwrap();
    }
}

#[test]
fn test_need_wakeup_flag() {
    let (prod, cons) = local_pair::<u64>(4).unwrap();
    assert!(!prod.needs_wakeup());
    cons.set_need_wakeup(true);
    assert!(prod.needs_wakeup());
    assert!(cons.needs_wakeup());
    cons.set_need_wakeup(false);
    assert!(!prod.needs_wakeup());
}

#[test]
fn test_capacity_must_be_power_of_two() {
    assert!(local_pair::<u64>(6).is_err());
}
