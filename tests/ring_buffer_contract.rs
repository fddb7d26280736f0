//! Contract tests for the ring buffer facade
//!
//! Exercises construction validation, address translation, the claim/publish
//! protocol, gating-based backpressure and capacity accounting through the
//! public API only.

use seqring::{
    BlockingWaitStrategy, BusySpinWaitStrategy, DefaultEventFactory, RingBuffer, RingError,
    Sequence, INITIAL_CURSOR_VALUE,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Default)]
struct Event {
    value: i64,
}

fn single(buffer_size: usize) -> RingBuffer<Event> {
    RingBuffer::with_single_producer(
        DefaultEventFactory::<Event>::new(),
        buffer_size,
        Arc::new(BusySpinWaitStrategy::new()),
    )
    .unwrap()
}

#[test]
fn construction_accepts_only_powers_of_two() {
    for size in [1usize, 2, 4, 64, 4096] {
        assert_eq!(single(size).buffer_size(), size);
    }
    for size in [0usize, 3, 5, 6, 7, 100, 1023] {
        let result = RingBuffer::<Event>::with_single_producer(
            DefaultEventFactory::new(),
            size,
            Arc::new(BusySpinWaitStrategy::new()),
        );
        assert!(matches!(result, Err(RingError::InvalidBufferSize(s)) if s == size));
    }
}

#[test]
fn sequences_one_buffer_apart_share_a_slot() {
    let buffer = single(16);
    for s in [0i64, 1, 9, 15, 31, 100] {
        assert!(std::ptr::eq(buffer.get(s), buffer.get(s + 16)));
        assert!(std::ptr::eq(buffer.get(s), buffer.get(s + 32)));
    }
}

#[test]
fn published_sequence_is_immediately_waitable() {
    let buffer = Arc::new(RingBuffer::with_single_producer(
        DefaultEventFactory::<Event>::new(),
        8,
        Arc::new(BlockingWaitStrategy::new()),
    )
    .unwrap());

    let seq = buffer.next();
    unsafe {
        (*buffer.get_mut_unchecked(seq)).value = 7;
    }
    buffer.publish(seq);

    // A wait started after the publish must resolve without blocking.
    let barrier = buffer.new_barrier();
    let available = barrier.wait_for(seq).unwrap();
    assert!(available >= seq);
    assert_eq!(buffer.get(seq).value, 7);
}

#[test]
fn remaining_capacity_is_full_at_rest() {
    let buffer = single(32);
    assert_eq!(buffer.remaining_capacity(), 32);
    assert!(buffer.remaining_capacity() >= 0);
    assert_eq!(buffer.cursor(), INITIAL_CURSOR_VALUE);
}

#[test]
fn pinned_gating_sequence_rejects_claim_one_buffer_ahead() {
    let buffer = single(8);
    let gate = Arc::new(Sequence::new(INITIAL_CURSOR_VALUE));
    buffer.add_gating_sequences(&[Arc::clone(&gate)]);

    // With the gate in use at -1, sequences 0..=6 are claimable; claiming
    // g + buffer_size = 7 would overrun the gate's slot.
    for expected in 0..7 {
        assert_eq!(buffer.try_next().unwrap(), expected);
    }
    assert!(matches!(
        buffer.try_next(),
        Err(RingError::InsufficientCapacity)
    ));

    gate.set(0);
    assert_eq!(buffer.try_next().unwrap(), 7);
}

#[test]
fn capacity_scenario_from_empty_to_reclaim() {
    // Size 4: claim and publish 0..=3 with no consumer registered; the
    // buffer reports itself full. Registering a consumer done with 3 frees
    // slot 0 and the next claim returns 4.
    let buffer = single(4);

    for expected in 0..4 {
        let seq = buffer.next();
        assert_eq!(seq, expected);
        buffer.publish(seq);
    }
    assert_eq!(buffer.remaining_capacity(), 0);

    let gate = Arc::new(Sequence::new(3));
    buffer.add_gating_sequences(&[gate]);
    assert_eq!(buffer.try_next().unwrap(), 4);
}

#[test]
fn concurrent_producers_claim_disjoint_sequences() {
    let buffer = Arc::new(RingBuffer::with_multi_producer(
        DefaultEventFactory::<Event>::new(),
        8,
        Arc::new(BlockingWaitStrategy::new()),
    )
    .unwrap());

    let mut claims = vec![];
    for _ in 0..2 {
        let buffer = Arc::clone(&buffer);
        claims.push(thread::spawn(move || {
            let seq = buffer.next();
            unsafe {
                (*buffer.get_mut_unchecked(seq)).value = seq;
            }
            buffer.publish(seq);
            seq
        }));
    }

    let mut claimed: Vec<i64> = claims.into_iter().map(|h| h.join().unwrap()).collect();
    claimed.sort_unstable();
    assert_eq!(claimed, vec![0, 1]);

    let barrier = buffer.new_barrier();
    let available = barrier.wait_for(1).unwrap();
    assert!(available >= 1);
    assert_eq!(buffer.get(0).value, 0);
    assert_eq!(buffer.get(1).value, 1);
}

#[test]
fn remove_gating_sequence_reports_membership() {
    let buffer = single(8);
    let registered = Arc::new(Sequence::new(2));
    let never_added = Arc::new(Sequence::new(2));
    buffer.add_gating_sequences(&[Arc::clone(&registered)]);

    assert!(!buffer.remove_gating_sequence(Arc::clone(&never_added)));
    assert!(buffer.remove_gating_sequence(Arc::clone(&registered)));

    // With the gate gone, capacity accounting no longer considers it.
    assert_eq!(buffer.minimum_gating_sequence(), INITIAL_CURSOR_VALUE);
    assert_eq!(buffer.remaining_capacity(), 8);
}

#[test]
fn minimum_gating_sequence_can_exclude_own_sequence() {
    let buffer = single(8);
    let own = Arc::new(Sequence::new(1));
    let other = Arc::new(Sequence::new(6));
    buffer.add_gating_sequences(&[Arc::clone(&own), Arc::clone(&other)]);

    assert_eq!(buffer.minimum_gating_sequence(), 1);
    assert_eq!(buffer.minimum_gating_sequence_excluding(Some(&own)), 6);
}

#[test]
fn reset_to_claims_and_publishes() {
    let buffer = single(8);
    buffer.reset_to(9);
    assert_eq!(buffer.cursor(), 9);
    assert_eq!(buffer.next(), 10);
}

#[test]
fn blocking_claim_resumes_when_gate_advances() {
    let buffer = Arc::new(RingBuffer::with_single_producer(
        DefaultEventFactory::<Event>::new(),
        4,
        Arc::new(BusySpinWaitStrategy::new()),
    )
    .unwrap());
    let gate = Arc::new(Sequence::new(INITIAL_CURSOR_VALUE));
    buffer.add_gating_sequences(&[Arc::clone(&gate)]);

    // Fill the claimable region: with the gate at -1, 0..=2 are claimable.
    for _ in 0..3 {
        let seq = buffer.next();
        buffer.publish(seq);
    }

    let producer = {
        let buffer = Arc::clone(&buffer);
        thread::spawn(move || buffer.next())
    };

    // The claim of sequence 3 must be parked until the gate advances.
    thread::sleep(Duration::from_millis(20));
    assert!(!producer.is_finished());

    gate.set(0);
    assert_eq!(producer.join().unwrap(), 3);
}
