//! End-to-end scenarios driving the full engine surface.

use serde_json::json;
use statecraft::core::{State, StateMachine};
use statecraft::events::{Event, EventBus};
use statecraft::hierarchy::HierarchicalState;
use statecraft::persistence::{JsonFileBackend, StatePersistence};
use statecraft::transitions::{event_transition, StateTransition, TransitionGuard};
use std::collections::HashMap;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(16);

#[test]
fn explicit_transition_beats_higher_priority_edge_elsewhere() {
    // Edges A->B (priority 5) and A->C (priority 10), both with always-true
    // guards. A direct transition_to("B") must succeed: only the A->B edge's
    // own guards matter. The A->C priority applies to the automatic
    // evaluation path, as the follow-up update shows.
    let mut machine = StateMachine::new("abc");
    for id in ["A", "B", "C"] {
        machine.add_state(State::new(id)).unwrap();
    }
    machine
        .add_transition(
            StateTransition::new("A", "B")
                .with_guard(TransitionGuard::conditional("always", |_| true))
                .with_priority(5),
        )
        .unwrap();
    machine
        .add_transition(
            StateTransition::new("A", "C")
                .with_guard(TransitionGuard::conditional("always", |_| true))
                .with_priority(10),
        )
        .unwrap();

    machine.start("A").unwrap();
    assert!(machine.transition_to("B", false).unwrap());
    assert_eq!(machine.current_state_id(), Some("B"));

    // From a fresh start, the automatic path picks the priority-10 edge.
    machine.stop();
    machine.start("A").unwrap();
    machine.update(TICK);
    assert_eq!(machine.current_state_id(), Some("C"));
}

#[test]
fn event_triggered_transition_is_level_triggered_and_fires_once() {
    let bus = EventBus::new();
    let mut machine = StateMachine::new("door").with_event_bus(bus.clone());
    machine.add_state(State::new("closed")).unwrap();
    machine.add_state(State::new("open")).unwrap();
    machine
        .add_transition(event_transition("closed", "open", "door.opened", &bus))
        .unwrap();

    machine.start("closed").unwrap();

    // An unrelated event leaves the latch unset: no transition on update.
    bus.dispatch(&Event::new("door.knocked"));
    machine.update(TICK);
    assert_eq!(machine.current_state_id(), Some("closed"));

    // The matching event arms the latch on a foreign call stack; the machine
    // consumes it on its next tick, exactly once.
    bus.dispatch(&Event::new("door.opened"));
    machine.update(TICK);
    assert_eq!(machine.current_state_id(), Some("open"));

    // The latch reset on commit: back in "closed", a tick with no new
    // dispatch does not re-fire.
    machine.transition_to("closed", true).unwrap();
    machine.update(TICK);
    assert_eq!(machine.current_state_id(), Some("closed"));
}

#[test]
fn dispatch_before_handle_event_also_consumes_the_latch() {
    let bus = EventBus::new();
    let mut machine = StateMachine::new("door").with_event_bus(bus.clone());
    machine.add_state(State::new("closed")).unwrap();
    machine.add_state(State::new("open")).unwrap();
    machine
        .add_transition(event_transition("closed", "open", "door.opened", &bus))
        .unwrap();
    machine.start("closed").unwrap();

    bus.dispatch(&Event::new("door.opened"));
    // handle_event re-checks transitions just like update.
    machine.handle_event(&Event::new("unrelated"));
    assert_eq!(machine.current_state_id(), Some("open"));
}

#[test]
fn timed_transition_fires_lazily_on_update() {
    let mut machine = StateMachine::new("brew");
    machine.add_state(State::new("steeping")).unwrap();
    machine.add_state(State::new("ready")).unwrap();
    machine
        .add_transition(statecraft::transitions::timed_transition(
            "steeping",
            "ready",
            Duration::from_millis(100),
        ))
        .unwrap();

    machine.start("steeping").unwrap();
    machine.update(TICK);
    assert_eq!(machine.current_state_id(), Some("steeping"));

    std::thread::sleep(Duration::from_millis(120));
    // Nothing fires until the machine is actually driven.
    assert_eq!(machine.current_state_id(), Some("steeping"));
    machine.update(TICK);
    assert_eq!(machine.current_state_id(), Some("ready"));
}

#[test]
fn hierarchical_state_nests_a_full_machine() {
    let mut combat = StateMachine::new("combat");
    combat.add_state(State::new("player_turn")).unwrap();
    combat.add_state(State::new("enemy_turn")).unwrap();
    combat
        .add_transition(
            StateTransition::new("player_turn", "enemy_turn")
                .with_guard(TransitionGuard::time_elapsed(Duration::ZERO)),
        )
        .unwrap();

    let behavior = HierarchicalState::new(combat)
        .with_default_child("player_turn")
        .on_child_enter(|id, ctx| ctx.set("active_child", json!(id)))
        .on_child_exit(|id, ctx| ctx.set("last_child", json!(id)));

    let mut game = StateMachine::new("game");
    game.add_state(State::with_behavior("combat", behavior))
        .unwrap();
    game.add_state(State::new("menu")).unwrap();
    game.add_transition(
        StateTransition::new("combat", "menu")
            .with_guard(TransitionGuard::data_entry("fled", json!(true))),
    )
    .unwrap();

    // Entering the parent activates the default child.
    game.start("combat").unwrap();
    assert_eq!(game.context().get("active_child"), Some(&json!("player_turn")));

    // Driving the parent drives the child; the poll notices the child move.
    game.update(TICK);
    assert_eq!(game.context().get("active_child"), Some(&json!("enemy_turn")));
    assert_eq!(game.context().get("last_child"), Some(&json!("player_turn")));

    // Exiting the parent stops the child machine and fires a final exit.
    game.context_mut().set("fled", json!(true));
    game.update(TICK);
    assert_eq!(game.current_state_id(), Some("menu"));
    assert_eq!(game.context().get("last_child"), Some(&json!("enemy_turn")));
}

#[test]
fn snapshot_round_trip_through_json_files() {
    let dir = std::env::temp_dir().join(format!("statecraft-it-{}", std::process::id()));
    let path = dir.join("saves").join("slot1.json");

    let build = || {
        let mut machine = StateMachine::new("quest");
        machine.add_state(State::new("town")).unwrap();
        machine.add_state(State::new("dungeon")).unwrap();
        machine
            .add_transition(StateTransition::new("town", "dungeon"))
            .unwrap();
        machine
    };

    let mut machine = build();
    machine.start("town").unwrap();
    machine.transition_to("dungeon", false).unwrap();
    machine.context_mut().set("gold", json!(250));
    machine.context_mut().set("party", json!(["fighter", "mage"]));

    let mut persistence = StatePersistence::new(JsonFileBackend::new());
    let mut custom = HashMap::new();
    custom.insert("slot_name".to_string(), json!("autosave"));
    let snapshot = persistence.create_snapshot(&machine, custom);
    persistence.save_snapshot(&snapshot, &path).unwrap();
    assert!(persistence.exists(&path));

    // Restore into a freshly built machine with the same configuration.
    let mut restored = build();
    restored.start("town").unwrap();
    let loaded = persistence.load_snapshot(&path).unwrap();
    persistence
        .restore_state_machine(&mut restored, &loaded)
        .unwrap();

    assert_eq!(restored.current_state_id(), Some("dungeon"));
    assert_eq!(restored.previous_state_id(), Some("town"));
    assert_eq!(restored.context().get("gold"), Some(&json!(250)));
    assert_eq!(
        restored.context().get("party"),
        Some(&json!(["fighter", "mage"]))
    );
    assert_eq!(loaded.custom_data.get("slot_name"), Some(&json!("autosave")));

    assert!(persistence.delete_snapshot(&path).unwrap());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn stop_start_cycle_discards_context_data() {
    let mut machine = StateMachine::new("fresh");
    machine.add_state(State::new("only")).unwrap();
    machine.start("only").unwrap();
    machine.context_mut().set("scratch", json!("value"));

    machine.stop();
    machine.start("only").unwrap();
    assert!(machine.context().get("scratch").is_none());
}
