//! Role assignment at game start.
//!
//! Builds a pool of exactly one [`Role::Infiltrated`] and one
//! [`Role::IntelOfficer`], padded with [`Role::Guard`] entries up to the
//! number of non-host players, then draws without replacement. With two
//! or more joiners this guarantees exactly one of each special role.

use rand::Rng;

use crate::protocol::{Player, Role};

/// Assign roles to every non-host player in `players`.
///
/// Host entries are left untouched. With a single non-host player the
/// pool still holds both special roles, so that player draws one of the
/// two at random; the host-side start gate normally prevents reaching
/// that case (see [`HostConfig::min_players`](crate::host::HostConfig)).
pub fn assign_roles<R: Rng>(players: &mut [Player], rng: &mut R) {
    let n = players.iter().filter(|p| p.role != Role::Host).count();

    let mut pool = vec![Role::Infiltrated, Role::IntelOfficer];
    while pool.len() < n {
        pool.push(Role::Guard);
    }

    for player in players.iter_mut().filter(|p| p.role != Role::Host) {
        if pool.is_empty() {
            break;
        }
        let idx = rng.gen_range(0..pool.len());
        player.role = pool.swap_remove(idx);
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn crew(joiners: usize) -> Vec<Player> {
        let mut players = vec![Player::new("Capitaine", Role::Host)];
        for i in 0..joiners {
            players.push(Player::new(format!("Garde {i}"), Role::Guard));
        }
        players
    }

    fn count(players: &[Player], role: Role) -> usize {
        players.iter().filter(|p| p.role == role).count()
    }

    #[test]
    fn exactly_one_of_each_special_role() {
        for joiners in 2..=8 {
            let mut players = crew(joiners);
            assign_roles(&mut players, &mut rand::thread_rng());

            assert_eq!(count(&players, Role::Host), 1, "n = {joiners}");
            assert_eq!(count(&players, Role::Infiltrated), 1, "n = {joiners}");
            assert_eq!(count(&players, Role::IntelOfficer), 1, "n = {joiners}");
            assert_eq!(count(&players, Role::Guard), joiners - 2, "n = {joiners}");
        }
    }

    #[test]
    fn host_role_is_never_reassigned() {
        let mut players = crew(5);
        assign_roles(&mut players, &mut rand::thread_rng());
        assert_eq!(players[0].role, Role::Host);
        assert_eq!(players[0].name, "Capitaine");
    }

    #[test]
    fn every_joiner_gets_a_role() {
        let mut players = crew(6);
        assign_roles(&mut players, &mut rand::thread_rng());
        // No joiner is skipped: six drawn roles, all from the pool.
        assert!(players.iter().skip(1).all(|p| p.role != Role::Host));
    }

    #[test]
    fn single_joiner_draws_one_special_role() {
        // Below the start gate, but the draw itself still degrades
        // gracefully: the lone joiner gets one of the two special roles.
        let mut players = crew(1);
        assign_roles(&mut players, &mut rand::thread_rng());
        assert!(matches!(
            players[1].role,
            Role::Infiltrated | Role::IntelOfficer
        ));
    }

    #[test]
    fn zero_joiners_is_a_noop() {
        let mut players = crew(0);
        assign_roles(&mut players, &mut rand::thread_rng());
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].role, Role::Host);
    }
}
