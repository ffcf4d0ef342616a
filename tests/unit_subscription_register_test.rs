use bayeuxd::core::protocol::Channel;
use bayeuxd::core::registry::SubscriptionRegister;

fn patterns(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_add_and_lookup() {
    let register = SubscriptionRegister::new();
    register.add_subscription(1, &patterns(&["/foo/**", "/bar/baz"]));

    assert_eq!(register.subscribers(&patterns(&["/foo/**"])), vec![1]);
    assert_eq!(register.subscribers(&patterns(&["/bar/baz"])), vec![1]);
    assert!(register.subscribers(&patterns(&["/other"])).is_empty());
}

#[tokio::test]
async fn test_lookup_through_expansion() {
    let register = SubscriptionRegister::new();
    register.add_subscription(1, &patterns(&["/foo/**"]));
    register.add_subscription(2, &patterns(&["/foo/bar"]));
    register.add_subscription(3, &patterns(&["/foo/*"]));

    let mut subscribers = register.subscribers(&Channel::new("/foo/bar").expand());
    subscribers.sort_unstable();
    assert_eq!(subscribers, vec![1, 2, 3]);

    let deep = register.subscribers(&Channel::new("/foo/bar/baz").expand());
    assert_eq!(deep, vec![1]);
}

#[tokio::test]
async fn test_subscriber_appears_once_per_matching_pattern() {
    let register = SubscriptionRegister::new();
    register.add_subscription(1, &patterns(&["/**", "/foo/*"]));

    // The union preserves one entry per matching pattern; de-duplication is
    // the caller's concern.
    let subscribers = register.subscribers(&Channel::new("/foo/bar").expand());
    assert_eq!(subscribers.len(), 2);
    assert!(subscribers.iter().all(|id| *id == 1));
}

#[tokio::test]
async fn test_counts_track_map_sizes() {
    let register = SubscriptionRegister::new();
    assert_eq!(register.pattern_count(), 0);
    assert_eq!(register.subscriber_count(), 0);

    register.add_subscription(1, &patterns(&["/a", "/b"]));
    register.add_subscription(2, &patterns(&["/a"]));
    assert_eq!(register.pattern_count(), 2);
    assert_eq!(register.subscriber_count(), 2);

    register.remove_subscription(2, &patterns(&["/a"]));
    assert_eq!(register.pattern_count(), 2);
    assert_eq!(register.subscriber_count(), 1);
}

#[tokio::test]
async fn test_empty_buckets_are_pruned() {
    let register = SubscriptionRegister::new();
    register.add_subscription(1, &patterns(&["/a"]));
    register.remove_subscription(1, &patterns(&["/a"]));

    assert_eq!(register.pattern_count(), 0);
    assert_eq!(register.subscriber_count(), 0);
    assert!(register.subscribers(&patterns(&["/a"])).is_empty());
}

#[tokio::test]
async fn test_subscribe_unsubscribe_round_trip() {
    let register = SubscriptionRegister::new();
    register.add_subscription(1, &patterns(&["/keep"]));

    let before_patterns = register.pattern_count();
    let before_subscribers = register.subscriber_count();

    register.add_subscription(2, &patterns(&["/a", "/b", "/keep"]));
    register.remove_subscription(2, &patterns(&["/a", "/b", "/keep"]));

    assert_eq!(register.pattern_count(), before_patterns);
    assert_eq!(register.subscriber_count(), before_subscribers);
    assert_eq!(register.subscribers(&patterns(&["/keep"])), vec![1]);
}

#[tokio::test]
async fn test_remove_missing_pair_is_harmless() {
    let register = SubscriptionRegister::new();
    register.add_subscription(1, &patterns(&["/a"]));

    register.remove_subscription(1, &patterns(&["/not-there"]));
    register.remove_subscription(99, &patterns(&["/a"]));

    assert_eq!(register.subscribers(&patterns(&["/a"])), vec![1]);
    assert_eq!(register.pattern_count(), 1);
}

#[tokio::test]
async fn test_remove_all() {
    let register = SubscriptionRegister::new();
    register.add_subscription(1, &patterns(&["/a", "/b"]));
    register.add_subscription(2, &patterns(&["/a"]));

    register.remove_all(1);

    assert_eq!(register.subscribers(&patterns(&["/a"])), vec![2]);
    assert!(register.subscribers(&patterns(&["/b"])).is_empty());
    assert_eq!(register.pattern_count(), 1);
    assert_eq!(register.subscriber_count(), 1);
}

#[tokio::test]
async fn test_remove_all_unknown_subscriber() {
    let register = SubscriptionRegister::new();
    register.add_subscription(1, &patterns(&["/a"]));

    register.remove_all(42);

    assert_eq!(register.subscribers(&patterns(&["/a"])), vec![1]);
}
