use super::*;

fn ts(ms: u64) -> Timestamp {
    Timestamp::from_duration(Duration::from_millis(ms))
}

fn app_state() -> AckState {
    AckState::new(PacketNumberSpace::ApplicationData, Duration::from_millis(25))
}

#[test]
fn first_ack_eliciting_packet_is_acked_immediately() {
    let mut state = app_state();
    state.receive(ts(0), PacketNumber::new(0), true);
    assert!(state.should_send_ack(ts(0)));
}

#[test]
fn out_of_order_packet_is_acked_immediately() {
    let mut state = app_state();
    state.receive(ts(0), PacketNumber::new(5), true);
    state.sent_ack();

    // 3 arrives after 5 was already the max -- out of order, rule 2.
    state.receive(ts(10), PacketNumber::new(3), true);
    assert!(state.should_send_ack(ts(10)));
}

#[test]
fn gap_before_newest_packet_forces_immediate_ack() {
    let mut state = app_state();
    state.receive(ts(0), PacketNumber::new(0), true);
    state.sent_ack();

    // packet 2 leaves a gap at 1 -- rule 3.
    state.receive(ts(10), PacketNumber::new(2), true);
    assert!(state.should_send_ack(ts(10)));
}

#[test]
fn second_consecutive_unacked_eliciting_packet_forces_immediate_ack() {
    let mut state = app_state();
    state.receive(ts(0), PacketNumber::new(0), true);
    state.sent_ack();

    state.receive(ts(5), PacketNumber::new(1), true);
    assert!(!state.should_send_ack(ts(5)));

    state.receive(ts(10), PacketNumber::new(2), true);
    assert!(state.should_send_ack(ts(10)));
}

#[test]
fn non_application_space_always_acks_immediately() {
    let mut state = AckState::new(PacketNumberSpace::Initial, Duration::from_millis(25));
    state.receive(ts(0), PacketNumber::new(0), true);
    assert!(state.should_send_ack(ts(0)));
}

#[test]
fn deferred_ack_is_scheduled_max_ack_delay_minus_granularity_out() {
    let mut state = app_state();
    state.receive(ts(0), PacketNumber::new(0), true);
    state.sent_ack();

    state.receive(ts(5), PacketNumber::new(1), true);
    assert!(!state.should_send_ack(ts(5)));
    assert_eq!(state.next_ack_deadline(), Some(ts(5) + Duration::from_millis(24)));
}

#[test]
fn non_ack_eliciting_packet_never_schedules_an_ack() {
    let mut state = app_state();
    state.receive(ts(0), PacketNumber::new(0), false);
    assert!(!state.should_send_ack(ts(1000)));
    assert_eq!(state.acks_to_send(ts(0)).unwrap().ranges.num_ranges(), 1);
}

#[test]
fn should_process_rejects_duplicates_and_aged_out_numbers() {
    let mut state = app_state();
    state.receive(ts(0), PacketNumber::new(10), true);
    assert!(!state.should_process(PacketNumber::new(10)));
    assert!(!state.should_process(PacketNumber::new(5)));
    assert!(state.should_process(PacketNumber::new(11)));
}

#[test]
fn more_than_eight_ranges_trims_the_oldest() {
    let mut state = app_state();
    for i in 0..20 {
        // every other number, so each insertion is its own range
        state.receive(ts(i), PacketNumber::new(i as i64 * 2), false);
    }
    assert!(state.seen.num_ranges() <= MAX_ACK_RANGES);
}

#[test]
fn acks_to_send_reports_ack_delay_since_max_recv_time() {
    let mut state = app_state();
    state.receive(ts(100), PacketNumber::new(0), true);
    let pending = state.acks_to_send(ts(130)).unwrap();
    assert_eq!(pending.ack_delay, Duration::from_millis(30));
}

#[test]
fn sent_ack_clears_schedule_and_debt() {
    let mut state = app_state();
    state.receive(ts(0), PacketNumber::new(0), true);
    assert!(state.should_send_ack(ts(0)));
    state.sent_ack();
    assert!(!state.should_send_ack(ts(0)));
    assert_eq!(state.unacked_ack_eliciting, 0);
}

#[test]
fn handle_ack_stops_advertising_acknowledged_range() {
    let mut state = app_state();
    state.receive(ts(0), PacketNumber::new(0), true);
    state.receive(ts(1), PacketNumber::new(1), true);
    state.receive(ts(2), PacketNumber::new(2), true);

    state.handle_ack(PacketNumber::new(1));
    assert!(!state.should_process(PacketNumber::new(0)));
    assert!(!state.should_process(PacketNumber::new(1)));
    // still tracked: 2 is above the acknowledged range
    assert!(!state.should_process(PacketNumber::new(2)));
    assert!(state.should_process(PacketNumber::new(3)));
}

#[test]
fn handle_ack_keeps_the_range_containing_the_largest_acked_number() {
    let mut state = app_state();
    // two disjoint ranges: [0, 2) and [5, 7)
    state.receive(ts(0), PacketNumber::new(0), true);
    state.receive(ts(1), PacketNumber::new(1), true);
    state.receive(ts(2), PacketNumber::new(5), true);
    state.receive(ts(3), PacketNumber::new(6), true);

    // peer's largest acked falls inside the [5, 7) range
    state.handle_ack(PacketNumber::new(5));

    // the older, fully-below range is discarded
    assert!(state.should_process(PacketNumber::new(0)));
    assert!(state.should_process(PacketNumber::new(1)));
    // the containing range itself must survive, not just the numbers above it
    assert!(!state.should_process(PacketNumber::new(5)));
    assert!(!state.should_process(PacketNumber::new(6)));
}
