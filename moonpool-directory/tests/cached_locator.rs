//! Cached locator behaviour against a recording directory.
//!
//! Covers:
//! - Cache hits after registration and lookup never reach the directory
//! - Registration races: the directory's winner replaces a cached loser
//! - Dead-silo reaction: one bulk unregister per newly dead silo
//! - Stale winners on dead silos are retried, then given up on
//! - Re-registration replaces an entry only when the previous address matches
//! - Activations hosted on dead silos are never committed
//! - Lookups refresh membership for addresses newer than the local view

mod common;

use std::sync::Arc;

use moonpool_directory::{
    CachedGrainLocator, DirectoryError, GrainLocator, LocatorError, LocatorState,
    MembershipService, SharedMembership, SiloStatus, UnregistrationCause,
};

use common::{LaggingMembership, ScriptedDirectory, account, activation, silo};

fn setup(
    retries: u32,
) -> (
    Arc<SharedMembership>,
    Arc<ScriptedDirectory>,
    CachedGrainLocator,
) {
    common::init_tracing();
    let membership = Arc::new(SharedMembership::with_members(vec![silo(4500), silo(4501)]));
    let directory = ScriptedDirectory::new();
    let locator = CachedGrainLocator::new(
        "tables",
        directory.clone(),
        membership.clone(),
        retries,
    );
    (membership, directory, locator)
}

#[tokio::test]
async fn test_lookup_after_register_is_served_from_cache() {
    let (_membership, directory, locator) = setup(1);
    let alice = account("alice");
    let address = activation(&alice, 4500, 1, 2);

    let winner = locator.register(address.clone(), None).await.expect("register");
    assert_eq!(winner, address);

    for _ in 0..3 {
        let found = locator.lookup(&alice).await.expect("lookup");
        assert_eq!(found, Some(address.clone()));
    }
    assert_eq!(directory.lookup_count(), 0);
    assert_eq!(locator.try_lookup_in_cache(&alice), Some(address));
}

#[tokio::test]
async fn test_lookup_miss_populates_cache() {
    let (_membership, directory, locator) = setup(1);
    let alice = account("alice");
    let address = activation(&alice, 4501, 7, 2);
    directory.seed(address.clone());

    assert_eq!(locator.try_lookup_in_cache(&alice), None);
    assert_eq!(locator.lookup(&alice).await.expect("lookup"), Some(address.clone()));
    assert_eq!(locator.lookup(&alice).await.expect("lookup"), Some(address));
    assert_eq!(directory.lookup_count(), 1);
}

#[tokio::test]
async fn test_lookup_of_unknown_grain_is_none() {
    let (_membership, directory, locator) = setup(1);
    assert_eq!(locator.lookup(&account("nobody")).await.expect("lookup"), None);
    assert_eq!(directory.lookup_count(), 1);
    assert_eq!(locator.cached_len(), 0);
}

#[tokio::test]
async fn test_registration_race_replaces_cached_loser() {
    let (_membership, directory, locator) = setup(1);
    let alice = account("alice");
    let first = activation(&alice, 4500, 1, 2);
    let second = activation(&alice, 4501, 2, 2);

    locator.register(first.clone(), None).await.expect("register first");
    directory.script_winner(second.clone());
    let winner = locator.register(first.clone(), None).await.expect("register again");

    assert_eq!(winner, second);
    assert_eq!(locator.try_lookup_in_cache(&alice), Some(second));
    let losers: Vec<_> = directory
        .unregistered()
        .into_iter()
        .filter(|(address, _)| address == &first)
        .collect();
    assert_eq!(
        losers,
        vec![(first, UnregistrationCause::NonexistentActivation)]
    );
}

#[tokio::test]
async fn test_existing_live_winner_is_returned_without_retry() {
    let (_membership, directory, locator) = setup(1);
    let alice = account("alice");
    let existing = activation(&alice, 4501, 9, 2);
    directory.seed(existing.clone());

    let winner = locator
        .register(activation(&alice, 4500, 1, 2), None)
        .await
        .expect("register");
    assert_eq!(winner, existing);
    assert_eq!(directory.register_count(), 1);
    assert!(directory.unregistered().is_empty());
}

#[tokio::test]
async fn test_register_replaces_entry_when_previous_matches() {
    let (_membership, directory, locator) = setup(1);
    let alice = account("alice");
    let existing = activation(&alice, 4501, 9, 2);
    let replacement = activation(&alice, 4500, 1, 2);
    directory.seed(existing.clone());

    let winner = locator
        .register(replacement.clone(), None)
        .await
        .expect("register");
    assert_eq!(winner, existing);
    assert_eq!(locator.try_lookup_in_cache(&alice), Some(existing.clone()));

    let winner = locator
        .register(replacement.clone(), Some(&existing))
        .await
        .expect("re-register");
    assert_eq!(winner, replacement);
    assert_eq!(locator.try_lookup_in_cache(&alice), Some(replacement.clone()));
    assert_eq!(directory.stored(&alice), Some(replacement));
}

#[tokio::test]
async fn test_register_keeps_entry_when_previous_does_not_match() {
    let (_membership, directory, locator) = setup(1);
    let alice = account("alice");
    let existing = activation(&alice, 4501, 9, 2);
    let replacement = activation(&alice, 4500, 1, 2);
    let unrelated = activation(&alice, 4500, 42, 2);
    directory.seed(existing.clone());

    let winner = locator
        .register(replacement, Some(&unrelated))
        .await
        .expect("register");
    assert_eq!(winner, existing);
    assert_eq!(locator.try_lookup_in_cache(&alice), Some(existing.clone()));
    assert_eq!(directory.stored(&alice), Some(existing));
}

#[tokio::test]
async fn test_register_on_dead_silo_is_not_committed() {
    let (membership, directory, locator) = setup(1);
    membership
        .update_status(&silo(4500), SiloStatus::Dead)
        .expect("mark dead");
    let alice = account("alice");
    let doomed = activation(&alice, 4500, 1, 2);

    let result = locator.register(doomed.clone(), None).await;
    match result {
        Err(LocatorError::SiloDead { grain_id, silo: host }) => {
            assert_eq!(grain_id, alice);
            assert_eq!(host, silo(4500));
        }
        other => panic!("expected dead silo, got {other:?}"),
    }
    assert_eq!(locator.cached_len(), 0);
    assert_eq!(directory.stored(&alice), None);
    assert_eq!(
        directory.unregistered(),
        vec![(doomed, UnregistrationCause::SiloDied)]
    );
}

#[tokio::test]
async fn test_dead_silo_reaction_purges_cache_once() {
    let (membership, directory, locator) = setup(1);
    locator.start();
    assert_eq!(locator.state(), LocatorState::Active);
    let baseline = membership.current_snapshot().version;
    locator.wait_for_version(baseline).await.expect("baseline");

    let alice = account("alice");
    let bob = account("bob");
    let on_doomed = activation(&alice, 4500, 1, 2);
    let on_survivor = activation(&bob, 4501, 2, 2);
    locator.register(on_doomed.clone(), None).await.expect("register alice");
    locator.register(on_survivor.clone(), None).await.expect("register bob");

    let version = membership
        .update_status(&silo(4500), SiloStatus::Dead)
        .expect("mark dead");
    locator.wait_for_version(version).await.expect("processed");

    assert_eq!(locator.try_lookup_in_cache(&alice), None);
    assert_eq!(locator.try_lookup_in_cache(&bob), Some(on_survivor));
    assert_eq!(directory.unregistered_silos(), vec![vec![silo(4500)]]);
    assert_eq!(directory.stored(&alice), None);

    // A later update keeps the silo dead but does not re-trigger cleanup.
    let version = membership.register_silo(silo(4502), SiloStatus::Active, "silo-2");
    locator.wait_for_version(version).await.expect("processed");
    assert_eq!(directory.unregistered_silos().len(), 1);

    locator.stop().await;
    assert_eq!(locator.state(), LocatorState::Stopped);
}

#[tokio::test]
async fn test_wait_for_version_requires_running_locator() {
    let (membership, _directory, locator) = setup(1);
    let version = membership.current_snapshot().version;
    let result = locator.wait_for_version(version).await;
    assert!(matches!(
        result,
        Err(LocatorError::NotActive {
            state: LocatorState::Stopped
        })
    ));
}

#[tokio::test]
async fn test_unregister_clears_cache() {
    let (_membership, directory, locator) = setup(1);
    let alice = account("alice");
    let address = activation(&alice, 4500, 1, 2);
    locator.register(address.clone(), None).await.expect("register");

    locator
        .unregister(&address, UnregistrationCause::Force)
        .await
        .expect("unregister");

    assert_eq!(locator.try_lookup_in_cache(&alice), None);
    assert_eq!(directory.stored(&alice), None);
    assert_eq!(
        directory.unregistered(),
        vec![(address, UnregistrationCause::Force)]
    );
}

#[tokio::test]
async fn test_unregister_of_other_activation_keeps_cache() {
    let (_membership, _directory, locator) = setup(1);
    let alice = account("alice");
    let current = activation(&alice, 4500, 1, 2);
    locator.register(current.clone(), None).await.expect("register");

    locator
        .unregister(&activation(&alice, 4500, 99, 2), UnregistrationCause::Force)
        .await
        .expect("unregister");
    assert_eq!(locator.try_lookup_in_cache(&alice), Some(current));
}

#[tokio::test]
async fn test_stale_winner_on_dead_silo_is_replaced() {
    let (membership, directory, locator) = setup(1);
    membership
        .update_status(&silo(4501), SiloStatus::Dead)
        .expect("mark dead");
    let alice = account("alice");
    let stale = activation(&alice, 4501, 9, 2);
    directory.seed(stale.clone());

    let fresh = activation(&alice, 4500, 1, 3);
    let winner = locator.register(fresh.clone(), None).await.expect("register");

    assert_eq!(winner, fresh);
    assert_eq!(directory.register_count(), 2);
    assert_eq!(
        directory.unregistered(),
        vec![(stale, UnregistrationCause::SiloDied)]
    );
    assert_eq!(locator.try_lookup_in_cache(&alice), Some(fresh));
}

#[tokio::test]
async fn test_stale_winner_retries_are_bounded() {
    let (membership, directory, locator) = setup(1);
    membership
        .update_status(&silo(4501), SiloStatus::Dead)
        .expect("mark dead");
    let alice = account("alice");
    let stale = activation(&alice, 4501, 9, 2);
    directory.script_winner(stale.clone());
    directory.script_winner(stale);

    let result = locator.register(activation(&alice, 4500, 1, 3), None).await;
    match result {
        Err(LocatorError::StaleRegistration { grain_id, attempts }) => {
            assert_eq!(grain_id, alice);
            assert_eq!(attempts, 2);
        }
        other => panic!("expected stale registration, got {other:?}"),
    }
    assert_eq!(locator.cached_len(), 0);
}

#[tokio::test]
async fn test_lookup_pointing_at_dead_silo_is_unregistered() {
    let (membership, directory, locator) = setup(1);
    membership
        .update_status(&silo(4501), SiloStatus::Dead)
        .expect("mark dead");
    let alice = account("alice");
    let stale = activation(&alice, 4501, 9, 2);
    directory.seed(stale.clone());

    assert_eq!(locator.lookup(&alice).await.expect("lookup"), None);
    assert_eq!(
        directory.unregistered(),
        vec![(stale, UnregistrationCause::SiloDied)]
    );
    assert_eq!(locator.cached_len(), 0);
}

#[tokio::test]
async fn test_lookup_refreshes_membership_for_newer_address() {
    common::init_tracing();
    let shared = Arc::new(SharedMembership::with_members(vec![silo(4500)]));
    let lagging = LaggingMembership::new(shared.clone());
    shared.register_silo(silo(4501), SiloStatus::Active, "silo-1");
    shared
        .update_status(&silo(4501), SiloStatus::Dead)
        .expect("mark dead");

    let directory = ScriptedDirectory::new();
    let locator = CachedGrainLocator::new("tables", directory.clone(), lagging.clone(), 1);
    let alice = account("alice");
    let stale = activation(&alice, 4501, 9, 2);
    directory.seed(stale.clone());

    // The pinned view predates the silo, so only a refresh reveals it died.
    assert_eq!(locator.lookup(&alice).await.expect("lookup"), None);
    assert_eq!(lagging.refresh_count(), 1);
    assert_eq!(
        directory.unregistered(),
        vec![(stale, UnregistrationCause::SiloDied)]
    );
}

#[tokio::test]
async fn test_directory_errors_propagate() {
    let (_membership, directory, locator) = setup(1);
    directory.set_unavailable(true);
    let alice = account("alice");

    let result = locator.register(activation(&alice, 4500, 1, 2), None).await;
    assert!(matches!(
        result,
        Err(LocatorError::Directory(DirectoryError::Unavailable { .. }))
    ));
    assert!(matches!(
        locator.lookup(&alice).await,
        Err(LocatorError::Directory(_))
    ));
    assert_eq!(locator.cached_len(), 0);

    directory.set_unavailable(false);
    locator
        .register(activation(&alice, 4500, 1, 2), None)
        .await
        .expect("register after recovery");
}

#[tokio::test]
async fn test_invalidate_cache_forces_directory_lookup() {
    let (_membership, directory, locator) = setup(1);
    let alice = account("alice");
    locator
        .register(activation(&alice, 4500, 1, 2), None)
        .await
        .expect("register");

    locator.invalidate_cache(&alice);
    assert_eq!(locator.try_lookup_in_cache(&alice), None);
    locator.lookup(&alice).await.expect("lookup");
    assert_eq!(directory.lookup_count(), 1);
}
