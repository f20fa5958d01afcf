mod common;

use std::fs;

use distributed::PREFIX;
use machine_learning::StateDict;
use orchestrator::{Algorithm, ItemLocation, OrchestratorError};
use tempfile::tempdir;

use common::{build, single_device, train_step, wrapped};

fn module_state(algorithm: &Algorithm, name: &str) -> StateDict {
    algorithm.module(name).unwrap().state_dict()
}

fn strip(state: StateDict) -> StateDict {
    state
        .into_iter()
        .map(|(k, v)| (k.strip_prefix(PREFIX).unwrap().to_string(), v))
        .collect()
}

#[test]
fn round_trip_restores_every_component() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ckpt.bin");

    let mut saved = single_device();
    build(&mut saved, 4);
    train_step(&mut saved);
    train_step(&mut saved);
    saved.save_checkpoint(&path, 2, true).unwrap();

    let mut loaded = single_device();
    build(&mut loaded, 4);
    assert_ne!(module_state(&loaded, "gen"), module_state(&saved, "gen"));

    let items = saved.checkpoint_items(true);
    let iteration = loaded.load_checkpoint(&path, &items, false).unwrap();

    assert_eq!(iteration, 2);
    assert_eq!(loaded.last_iteration(), Some(2));
    for name in ["gen", "dis"] {
        assert_eq!(module_state(&loaded, name), module_state(&saved, name));

        let optimizer = |a: &Algorithm| a.optimizers().get(name).unwrap().state_dict();
        assert_eq!(optimizer(&loaded), optimizer(&saved));

        let scheduler = |a: &Algorithm| a.schedulers().get(name).unwrap().state_dict();
        assert_eq!(scheduler(&loaded), scheduler(&saved));
        assert_eq!(scheduler(&loaded).last_epoch, 2);
    }
}

#[test]
fn wrapped_checkpoint_loads_on_single_device() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ckpt.bin");

    let mut saved = wrapped();
    build(&mut saved, 4);
    train_step(&mut saved);
    saved.save_checkpoint(&path, 1, true).unwrap();
    assert!(module_state(&saved, "gen").keys().all(|k| k.starts_with(PREFIX)));

    let mut loaded = single_device();
    build(&mut loaded, 4);
    let items = loaded.checkpoint_items(true);
    loaded.load_checkpoint(&path, &items, false).unwrap();

    for name in ["gen", "dis"] {
        assert_eq!(
            module_state(&loaded, name),
            strip(module_state(&saved, name))
        );
    }
}

#[test]
fn single_device_checkpoint_loads_into_wrapped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ckpt.bin");

    let mut saved = single_device();
    build(&mut saved, 4);
    train_step(&mut saved);
    saved.save_checkpoint(&path, 1, false).unwrap();

    let mut loaded = wrapped();
    build(&mut loaded, 4);
    let items = loaded.checkpoint_items(false);
    loaded.load_checkpoint(&path, &items, true).unwrap();

    for name in ["gen", "dis"] {
        assert_eq!(
            strip(module_state(&loaded, name)),
            module_state(&saved, name)
        );
    }
}

#[test]
fn missing_file_is_not_found() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.bin");

    let mut algorithm = single_device();
    build(&mut algorithm, 4);

    let err = algorithm
        .load_checkpoint(&path, &["module_gen"], false)
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::CheckpointNotFound(p) if p == path));
}

#[test]
fn missing_items_are_reported_by_location() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ckpt.bin");

    let mut saved = single_device();
    build(&mut saved, 4);
    saved.save_checkpoint(&path, 0, false).unwrap();

    let mut loaded = single_device();
    build(&mut loaded, 4);

    for item in ["sched_gen", "module_ema", "iter"] {
        let err = loaded.load_checkpoint(&path, &[item], false).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::CheckpointItemMissing { item: ref i, location: ItemLocation::Checkpoint }
                if i == item
        ));
    }

    saved.save_checkpoint(&path, 0, true).unwrap();
    let mut bare = single_device();
    bare.create_model(
        &orchestrator::SequentialConstructor,
        true,
        &common::model_options(4),
    )
    .unwrap();

    let err = bare.load_checkpoint(&path, &["sched_gen"], false).unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::CheckpointItemMissing {
            location: ItemLocation::Components,
            ..
        }
    ));
}

#[test]
fn failed_load_changes_nothing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ckpt.bin");

    let mut saved = single_device();
    build(&mut saved, 4);
    train_step(&mut saved);
    saved.save_checkpoint(&path, 1, true).unwrap();

    let mut loaded = single_device();
    build(&mut loaded, 8);
    let before = module_state(&loaded, "dis");

    let err = loaded
        .load_checkpoint(&path, &["module_dis", "module_gen"], false)
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::ItemLoad { ref item, .. } if item == "module_gen"));
    assert_eq!(module_state(&loaded, "dis"), before);
    assert_eq!(loaded.last_iteration(), None);
}

#[test]
fn overwrites_in_place() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ckpt.bin");

    let mut algorithm = single_device();
    build(&mut algorithm, 4);
    algorithm.save_checkpoint(&path, 1, true).unwrap();
    train_step(&mut algorithm);
    algorithm.save_checkpoint(&path, 2, true).unwrap();

    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

    let mut loaded = single_device();
    build(&mut loaded, 4);
    let items = loaded.checkpoint_items(true);
    assert_eq!(loaded.load_checkpoint(&path, &items, false).unwrap(), 2);
    assert_eq!(
        module_state(&loaded, "gen"),
        module_state(&algorithm, "gen")
    );
}

#[test]
fn iteration_cannot_go_backwards() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ckpt.bin");

    let mut algorithm = single_device();
    build(&mut algorithm, 4);
    algorithm.save_checkpoint(&path, 5, true).unwrap();

    let err = algorithm.save_checkpoint(&path, 3, true).unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::IterationRegressed { last: 5, got: 3 }
    ));

    algorithm.save_checkpoint(&path, 5, true).unwrap();
}

#[test]
fn save_needs_a_model() {
    let dir = tempdir().unwrap();
    let mut algorithm = single_device();

    let err = algorithm
        .save_checkpoint(dir.path().join("ckpt.bin"), 0, true)
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NotCreated("model")));
}
