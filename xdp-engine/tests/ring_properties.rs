//! Properties of the ring protocol over arbitrary operation sequences.

use std::collections::VecDeque;

use proptest::prelude::*;
use xdp_engine::ring::local_pair_at;
use xdp_engine::{RingError, Violation};

#[derive(Debug, Clone)]
enum Op {
    Produce(u32),
    Consume(u32),
    Overcommit(u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..20u32).prop_map(Op::Produce),
        (0..20u32).prop_map(Op::Consume),
        (1..4u32).prop_map(Op::Overcommit),
    ]
}

proptest! {
    #[test]
    fn prop_fifo_and_bounded_occupancy(
        capacity_log in 0..5u32,
        start in prop_oneof![Just(0u32), Just(u32::MAX - 7), any::<u32>()],
        ops in proptest::collection::vec(op(), 1..200),
    ) {
        let capacity = 1u32 << capacity_log;
        let (mut prod, mut cons) = local_pair_at::<u64>(capacity, start).unwrap();
        let mut model = VecDeque::new();
        let mut next = 0u64;

        for op in ops {
            match op {
                Op::Produce(n) => {
                    let free = capacity - model.len() as u32;
                    let (count, first) = prod.reserve(n);
                    // reserve grants what fits, never more
                    prop_assert_eq!(count, n.min(free));
                    for i in 0..count {
                        prod.write(first.wrapping_add(i), next).unwrap();
                        model.push_back(next);
                        next += 1;
                    }
                    prod.submit(count).unwrap();
                }
                Op::Consume(n) => {
                    let (count, first) = cons.peek(n);
                    prop_assert_eq!(count, n.min(model.len() as u32));
                    for i in 0..count {
                        let value = cons.read(first.wrapping_add(i)).unwrap();
                        prop_assert_eq!(Some(value), model.pop_front());
                    }
                    cons.release(count).unwrap();
                }
                Op::Overcommit(extra) => {
                    let (count, _) = prod.reserve(1);
                    let err = prod.submit(count + extra).unwrap_err();
                    prop_assert_eq!(
                        err.clone(),
                        Violation::SubmitOverflow { requested: count + extra, reserved: count }
                    );
                    prop_assert!(RingError::from(err).is_protocol_violation());
                    prod.cancel(count).unwrap();
                }
            }
            prop_assert!(model.len() as u32 <= capacity);
            prop_assert_eq!(prod.free(), capacity - model.len() as u32);
            prop_assert_eq!(cons.pending(), model.len() as u32);
        }
    }

    #[test]
    fn prop_release_beyond_peek_is_rejected(
        produced in 0..16u32,
        peeked in 0..16u32,
        extra in 1..8u32,
    ) {
        let (mut prod, mut cons) = local_pair_at::<u64>(16, 0).unwrap();
        let (count, _) = prod.reserve(produced);
        prod.submit(count).unwrap();
        let (seen, _) = cons.peek(peeked);
        prop_assert_eq!(seen, produced.min(peeked));
        prop_assert_eq!(
            cons.release(seen + extra),
            Err(Violation::ReleaseOverflow { requested: seen + extra, peeked: seen })
        );
        cons.release(seen).unwrap();
        prop_assert_eq!(prod.free(), 16 - (produced - seen));
    }
}
