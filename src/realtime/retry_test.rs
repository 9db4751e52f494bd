use super::*;

#[test]
fn default_policy_is_five_linear_steps_of_three_seconds() {
    let policy = RetryPolicy::default();
    let delays: Vec<u128> =
        (0..5).map(|made| policy.next_delay(made).expect("within budget").as_millis()).collect();
    assert_eq!(delays, vec![3000, 6000, 9000, 12000, 15000]);
    assert_eq!(policy.next_delay(5), None);
}

#[test]
fn never_policy_has_no_budget() {
    assert_eq!(RetryPolicy::never().next_delay(0), None);
}

#[test]
fn fixed_backoff_ignores_attempt_number() {
    let backoff = Backoff::Fixed(Duration::from_millis(40));
    assert_eq!(backoff.delay(1), Duration::from_millis(40));
    assert_eq!(backoff.delay(9), Duration::from_millis(40));
}

#[test]
fn exponential_backoff_doubles_until_cap() {
    let backoff = Backoff::Exponential { base: Duration::from_secs(1), max: Duration::from_secs(10) };
    assert_eq!(backoff.delay(1), Duration::from_secs(1));
    assert_eq!(backoff.delay(2), Duration::from_secs(2));
    assert_eq!(backoff.delay(4), Duration::from_secs(8));
    assert_eq!(backoff.delay(5), Duration::from_secs(10));
    assert_eq!(backoff.delay(64), Duration::from_secs(10));
}

#[test]
fn attempt_zero_is_treated_as_first_attempt() {
    let backoff = Backoff::Linear { step: Duration::from_millis(100) };
    assert_eq!(backoff.delay(0), Duration::from_millis(100));
}
