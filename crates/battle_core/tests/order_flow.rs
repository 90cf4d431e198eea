//! Orders travelling from a raw submission through the inbox, the validator
//! and back out to each player's view.

use std::time::Duration;

use battle_core::inbox::{OrderInbox, SubmissionWindow};
use battle_core::prelude::*;
use battle_core::protocol::{decode_submit, ClientMessage};
use battle_test_utils::fixtures::{duel_match, unit_of};

const P0: PlayerId = PlayerId(0);
const P1: PlayerId = PlayerId(1);

#[test]
fn test_submission_reaches_the_board() {
    let mut game = duel_match(6);
    let scout = unit_of(&game, P0, UnitKind::Scout).unwrap();
    let json = format!(
        r#"{{"type":"submit_orders","tick":1,"orders":[{{"type":"Move","unit_id":{},"dest_q":-2,"dest_r":1}}]}}"#,
        scout.0
    );
    let submit = decode_submit(json.as_bytes(), game.rules().max_payload_bytes).unwrap();

    let mut inbox = OrderInbox::new(P0, SubmissionWindow::default());
    let target = inbox.submit(submit.tick, submit.orders(), 1, Duration::from_millis(200));
    assert_eq!(target, 1);

    let outcome = game.tick(inbox.drain());
    assert_eq!(outcome.accepted.len(), 1);
    assert_eq!(game.state().units[&scout].position, Hex::new(-2, 1));
}

#[test]
fn test_late_submission_runs_one_tick_later() {
    let mut game = duel_match(6);
    let scout = unit_of(&game, P0, UnitKind::Scout).unwrap();
    let mut inbox = OrderInbox::new(P0, SubmissionWindow::default());
    let order = Order::Move {
        unit: scout,
        dest: Hex::new(-2, 1),
    };
    assert_eq!(inbox.submit(1, [order], 1, Duration::from_millis(980)), 2);

    let first = game.tick(inbox.drain());
    assert!(first.accepted.is_empty());
    assert_eq!(game.buffered().len(), 1);
    assert_eq!(game.state().units[&scout].position, Hex::new(-3, 0));

    let second = game.tick(Vec::new());
    assert_eq!(second.accepted.len(), 1);
    assert_eq!(game.state().units[&scout].position, Hex::new(-2, 1));
}

#[test]
fn test_rejections_only_reach_the_submitter() {
    let mut game = duel_match(6);
    let enemy_scout = unit_of(&game, P1, UnitKind::Scout).unwrap();
    let mut inbox = OrderInbox::new(P0, SubmissionWindow::default());
    inbox.submit(
        1,
        [Order::Disband { unit: enemy_scout }],
        1,
        Duration::ZERO,
    );
    let outcome = game.tick(inbox.drain());

    let rejected = |view: &Snapshot| {
        view.events.iter().any(|e| {
            matches!(
                e,
                GameEvent::OrderRejected {
                    code: RejectCode::NotVisibleOrOwned,
                    ..
                }
            )
        })
    };
    assert!(rejected(&game.player_view(P0, &outcome)));
    assert!(!rejected(&game.player_view(P1, &outcome)));
    assert!(game.state().units.contains_key(&enemy_scout));
}

#[test]
fn test_fog_hides_distant_enemies() {
    let mut game = duel_match(6);
    let outcome = game.tick(Vec::new());
    let view = game.player_view(P0, &outcome);
    assert!(view.units.iter().all(|u| u.owner == Some(P0)));

    let full = game.spectator_view(Perspective::Full, &outcome);
    assert_eq!(full.units.len(), game.state().units.len());
}

#[test]
fn test_client_message_tag() {
    let json = br#"{"type":"submit_orders","tick":3,"orders":[{"type":"Disband","unit_id":2}]}"#;
    let message: ClientMessage = serde_json::from_slice(json).unwrap();
    let ClientMessage::SubmitOrders(submit) = message;
    assert_eq!(submit.orders().collect::<Vec<_>>(), vec![Order::Disband { unit: UnitId(2) }]);
}

#[test]
fn test_shipped_rules_match_defaults() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets/rules/default.ron");
    let rules = RulesConfig::load(&path).unwrap();
    assert_eq!(rules, RulesConfig::default());
}
