use super::*;

#[test]
fn set_then_get_finds_the_value_in_the_newest_sector() {
    let mut cache: TimeBoundedCache<i32> = TimeBoundedCache::with_sectors(Duration::from_secs(1), 3);
    cache.set("a".to_string(), 1);
    assert_eq!(cache.get("a"), Some(&1));
    assert_eq!(cache.sector_of("a"), Some(0));
}

#[test]
fn rotate_shifts_entries_back_and_eventually_evicts_them() {
    let mut cache: TimeBoundedCache<i32> = TimeBoundedCache::with_sectors(Duration::from_secs(4), 4);
    cache.set("a".to_string(), 1);

    assert_eq!(cache.sector_of("a"), Some(0));
    cache.rotate();
    assert_eq!(cache.sector_of("a"), Some(1));
    cache.rotate();
    cache.rotate();
    assert_eq!(cache.sector_of("a"), Some(3));

    let evicted = cache.rotate();
    assert!(cache.get("a").is_none());
    assert_eq!(evicted, vec![("a".to_string(), 1)]);
}

#[test]
fn re_setting_a_key_moves_it_back_to_sector_zero() {
    let mut cache: TimeBoundedCache<i32> = TimeBoundedCache::with_sectors(Duration::from_secs(4), 4);
    cache.set("a".to_string(), 1);
    cache.rotate();
    cache.rotate();
    assert_eq!(cache.sector_of("a"), Some(2));

    cache.set("a".to_string(), 2);
    assert_eq!(cache.sector_of("a"), Some(0));
    assert_eq!(cache.get("a"), Some(&2));
    assert_eq!(cache.len(), 1);
}

#[test]
fn delete_removes_from_whichever_sector_holds_the_key() {
    let mut cache: TimeBoundedCache<i32> = TimeBoundedCache::with_sectors(Duration::from_secs(4), 4);
    cache.set("a".to_string(), 1);
    cache.rotate();
    assert_eq!(cache.delete("a"), Some(1));
    assert!(cache.is_empty());
    assert_eq!(cache.delete("a"), None);
}

#[test]
fn get_mut_allows_in_place_mutation() {
    let mut cache: TimeBoundedCache<i32> = TimeBoundedCache::new(Duration::from_secs(1));
    cache.set("a".to_string(), 1);
    *cache.get_mut("a").unwrap() += 41;
    assert_eq!(cache.get("a"), Some(&42));
}

#[test]
fn take_matching_removes_only_matching_entries_across_sectors() {
    let mut cache: TimeBoundedCache<i32> = TimeBoundedCache::with_sectors(Duration::from_secs(4), 4);
    cache.set("a".to_string(), 1);
    cache.rotate();
    cache.set("b".to_string(), 2);

    let mut taken = cache.take_matching(|v| *v == 1);
    taken.sort();
    assert_eq!(taken, vec![("a".to_string(), 1)]);
    assert!(cache.get("a").is_none());
    assert_eq!(cache.get("b"), Some(&2));
}

#[test]
fn rotate_interval_divides_forget_timeout_by_sector_count() {
    let cache: TimeBoundedCache<i32> = TimeBoundedCache::with_sectors(Duration::from_millis(2000), 4);
    assert_eq!(cache.rotate_interval(), Duration::from_millis(500));
}
