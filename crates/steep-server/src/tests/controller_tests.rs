//! Tests for the type-check controller: drain semantics, priority
//! ordering, deterministic assignment, and request bookkeeping.

use std::path::{Path, PathBuf};

use crate::controller::{TypeCheckController, fresh_guid};

fn paths(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(PathBuf::from).collect()
}

#[test]
fn test_make_request_drains_changes() {
    let mut controller = TypeCheckController::new(2);
    controller.push_change(PathBuf::from("/sig/a.sig"));
    controller.push_change(PathBuf::from("/sig/b.sig"));
    assert!(controller.has_changes());

    let request = controller
        .make_request(None, "g1".to_string(), None)
        .unwrap();
    assert_eq!(request.total, 2);
    assert!(!controller.has_changes());

    // Nothing left: no new request.
    assert!(controller.make_request(None, "g2".to_string(), None).is_none());
}

#[test]
fn test_priority_paths_come_first_in_lexicographic_order() {
    let mut controller = TypeCheckController::new(1);
    controller.push_change(PathBuf::from("/sig/z.sig"));
    controller.push_change(PathBuf::from("/sig/b.sig"));
    controller.push_change(PathBuf::from("/sig/a.sig"));
    controller.update_priority(&paths(&["/sig/z.sig", "/sig/b.sig"]), &[]);

    let request = controller
        .make_request(None, "g1".to_string(), None)
        .unwrap();
    let assignment = request.paths_for(0);
    // Priority paths (b, z) lexicographic, then the rest.
    assert_eq!(
        assignment,
        paths(&["/sig/b.sig", "/sig/z.sig", "/sig/a.sig"]).as_slice()
    );
}

#[test]
fn test_priority_paths_round_robin_over_workers() {
    let mut controller = TypeCheckController::new(2);
    for name in ["/sig/a.sig", "/sig/b.sig", "/sig/c.sig"] {
        controller.push_change(PathBuf::from(name));
    }
    controller.update_priority(
        &paths(&["/sig/a.sig", "/sig/b.sig", "/sig/c.sig"]),
        &[],
    );

    let request = controller
        .make_request(None, "g1".to_string(), None)
        .unwrap();
    assert_eq!(request.paths_for(0), paths(&["/sig/a.sig", "/sig/c.sig"]).as_slice());
    assert_eq!(request.paths_for(1), paths(&["/sig/b.sig"]).as_slice());
}

#[test]
fn test_assignment_is_deterministic() {
    let build = || {
        let mut controller = TypeCheckController::new(3);
        for i in 0..20 {
            controller.push_change(PathBuf::from(format!("/sig/file{i}.sig")));
        }
        controller
            .make_request(None, "guid".to_string(), None)
            .unwrap()
            .assignments
    };
    assert_eq!(build(), build());
}

#[test]
fn test_dead_workers_receive_no_new_assignments() {
    let mut controller = TypeCheckController::new(2);
    assert_eq!(controller.live_worker_count(), 2);
    controller.remove_worker(0);
    assert_eq!(controller.live_worker_count(), 1);

    for name in ["/sig/a.sig", "/sig/b.sig", "/sig/c.sig", "/sig/d.sig"] {
        controller.push_change(PathBuf::from(name));
    }
    // One priority path exercises the round-robin arm too.
    controller.update_priority(&paths(&["/sig/a.sig"]), &[]);

    let request = controller
        .make_request(None, "g1".to_string(), None)
        .unwrap();
    assert!(request.paths_for(0).is_empty());
    assert_eq!(request.paths_for(1).len(), 4);
    assert_eq!(request.total, 4);
}

#[test]
fn test_no_live_workers_keeps_paths_dirty() {
    let mut controller = TypeCheckController::new(1);
    controller.remove_worker(0);
    controller.push_change(PathBuf::from("/sig/a.sig"));

    assert!(controller.make_request(None, "g1".to_string(), None).is_none());
    // The dirty set survives for whenever a worker comes back.
    assert!(controller.has_changes());
}

#[test]
fn test_update_priority_removes_closed_paths() {
    let mut controller = TypeCheckController::new(1);
    controller.update_priority(&paths(&["/sig/a.sig"]), &[]);
    assert!(controller.priority_paths().contains(Path::new("/sig/a.sig")));
    controller.update_priority(&[], &paths(&["/sig/a.sig"]));
    assert!(controller.priority_paths().is_empty());
}

#[test]
fn test_unfinished_request_carries_over() {
    let mut controller = TypeCheckController::new(1);
    controller.push_change(PathBuf::from("/sig/a.sig"));
    controller.push_change(PathBuf::from("/sig/b.sig"));
    let mut first = controller
        .make_request(None, "g1".to_string(), None)
        .unwrap();
    assert!(first.mark_checked(Path::new("/sig/a.sig")));

    controller.push_change(PathBuf::from("/sig/c.sig"));
    let second = controller
        .make_request(Some(&first), "g2".to_string(), None)
        .unwrap();
    // b (unchecked) and c (new), but not a.
    assert_eq!(second.total, 2);
    let all = second.remaining_paths();
    assert!(all.contains(&PathBuf::from("/sig/b.sig")));
    assert!(all.contains(&PathBuf::from("/sig/c.sig")));
}

#[test]
fn test_mark_checked_ignores_unassigned_paths() {
    let mut controller = TypeCheckController::new(1);
    controller.push_change(PathBuf::from("/sig/a.sig"));
    let mut request = controller
        .make_request(None, "g1".to_string(), None)
        .unwrap();
    assert!(!request.mark_checked(Path::new("/sig/other.sig")));
    assert_eq!(request.completed, 0);
    assert!(request.mark_checked(Path::new("/sig/a.sig")));
    assert!(request.finished());
    assert_eq!(request.percentage(), 100);
}

#[test]
fn test_fresh_guids_are_unique() {
    let a = fresh_guid();
    let b = fresh_guid();
    assert_ne!(a, b);
}
