use tile_traffic::simulation::{
    ids, Cell, Direction, GenerationFailure, GenerationState, Model, SimulationConfig, SupervisorState,
    Tile, TileId, Tilemap, TilemapConfig, World,
};

/// Drive a model to completion, dropping failed large tile picks
fn run_to_completion(mut model: Model) -> Model {
    for _ in 0..1_000_000 {
        match model.supervisor() {
            SupervisorState::Done => return model,
            SupervisorState::Recovering => {
                assert!(
                    model.discard_failed_pick(),
                    "unrecoverable failure: {:?}",
                    model.failure_description()
                );
            }
            SupervisorState::Generating => model.propagate(),
        }
    }
    panic!("generation did not finish");
}

fn assert_neighbors_pair(tilemap: &Tilemap) {
    let catalog = tilemap.catalog();
    for cell in tilemap.grid().cells() {
        let Some(id) = tilemap.fixed(&cell) else { continue };
        for (dir, neighbor) in tilemap.grid().neighbors(&cell) {
            let Some(other) = tilemap.fixed(&neighbor) else { continue };
            let mine = catalog.socket(id, dir).unwrap();
            let theirs = catalog.socket(other, dir.opposite()).unwrap();
            assert!(
                mine.pairs_with(theirs),
                "{} at {} ({:?}) does not pair with {} at {} ({:?})",
                id,
                cell,
                mine,
                other,
                neighbor,
                theirs
            );
        }
    }
}

fn assert_large_tiles_complete(tilemap: &Tilemap) {
    let catalog = tilemap.catalog();
    for cell in tilemap.grid().cells() {
        let Some(id) = tilemap.fixed(&cell) else { continue };
        let Some((parent, index)) = catalog.parent_of(id) else { continue };
        let large = catalog.large(parent).unwrap();
        let col = index as u32 % large.width;
        let row = index as u32 / large.width;
        let left = cell.x - col;
        let top = cell.y - row;
        for (i, part) in large.tiles.iter().enumerate() {
            let i = i as u32;
            let part_cell = Cell::new(left + i % large.width, top + i / large.width);
            assert_eq!(
                tilemap.fixed(&part_cell),
                Some(part.id),
                "{} at {} is missing part {} at {}",
                parent,
                cell,
                part.id,
                part_cell
            );
        }
    }
}

#[test]
fn test_generation_terminates_for_several_seeds() {
    for seed in 0..5 {
        let model = run_to_completion(Model::init(TilemapConfig::city(8, 8, seed)));
        assert_eq!(model.supervisor(), SupervisorState::Done);
        assert!(model.tilemap().is_solved(), "seed {} left open cells", seed);
        assert_eq!(model.fixed_cells(), 64);
        assert!(model.steps() > 0);
        assert!(model.picks() >= model.dropped_picks());
    }
}

#[test]
fn test_generated_neighbors_are_compatible() {
    for seed in [3, 11, 27] {
        let model = run_to_completion(Model::init(TilemapConfig::city(10, 7, seed)));
        assert_neighbors_pair(model.tilemap());
    }
}

#[test]
fn test_large_tiles_are_placed_whole() {
    for seed in [1, 5, 9, 13] {
        let model = run_to_completion(Model::init(TilemapConfig::city(9, 9, seed)));
        assert_large_tiles_complete(model.tilemap());
    }
}

#[test]
fn test_partial_generation_stays_consistent() {
    let mut model = Model::init(TilemapConfig::city(8, 8, 4));
    for _ in 0..150 {
        if model.supervisor() == SupervisorState::Recovering {
            model.discard_failed_pick();
        }
        model.propagate();
        assert_neighbors_pair(model.tilemap());
    }
    for tile in model.tilemap().tiles() {
        if let Tile::Superposition(options) = tile {
            assert!(!options.is_empty());
        }
    }
}

#[test]
fn test_same_seed_generates_same_map() {
    let a = run_to_completion(Model::init(TilemapConfig::city(8, 6, 77)));
    let b = run_to_completion(Model::init(TilemapConfig::city(8, 6, 77)));
    assert_eq!(a.tilemap().render(), b.tilemap().render());
    assert_eq!(a.steps(), b.steps());
}

#[test]
fn test_no_potential_match_does_not_stop_generation() {
    let mut model = Model::init(TilemapConfig::city(3, 3, 1));
    model.pick_tile(Cell::new(1, 1), ids::GRASS).unwrap();
    model.pick_tile(Cell::new(2, 1), ids::GRASS).unwrap();

    // Both picks, then matching from (1, 1) into the already fixed (2, 1)
    model.propagate();
    model.propagate();
    model.propagate();

    assert_eq!(model.supervisor(), SupervisorState::Generating);
    assert_eq!(model.state(), &GenerationState::Propagating);
    assert!(!model.stopped());
}

#[test]
fn test_invalid_large_tile_recovers_after_discard() {
    let mut model = Model::init(TilemapConfig::city(3, 3, 1));
    model.pick_tile(Cell::new(3, 3), ids::PARK).unwrap();
    model.propagate();

    assert!(model.stopped());
    assert_eq!(
        model.state(),
        &GenerationState::Failure(GenerationFailure::InvalidBigTilePlacement {
            cell: Cell::new(3, 3),
            tile: ids::PARK,
        })
    );
    assert!(model.failure_description().is_some());

    assert!(model.discard_failed_pick());
    assert_eq!(model.supervisor(), SupervisorState::Generating);
    let finished = run_to_completion(model);
    assert!(finished.tilemap().is_solved());
}

#[test]
fn test_pick_tile_rejects_bad_input() {
    let mut model = Model::init(TilemapConfig::city(3, 3, 1));
    assert_eq!(
        model.pick_tile(Cell::new(9, 9), ids::GRASS),
        Err(GenerationFailure::InvalidDirection {
            cell: Cell::new(9, 9),
            direction: None,
        })
    );
    assert_eq!(
        model.pick_tile(Cell::new(1, 1), TileId(999)),
        Err(GenerationFailure::TileNotFound(TileId(999)))
    );
    assert_eq!(model.pending_steps(), 0);
}

#[test]
fn test_forced_road_pick_constrains_neighbors() {
    let mut model = Model::init(TilemapConfig::city(5, 5, 8));
    let horizontal = ids::road(Direction::Left.bit() | Direction::Right.bit());
    model.pick_tile(Cell::new(3, 3), horizontal).unwrap();
    let finished = run_to_completion(model);
    let tilemap = finished.tilemap();

    assert_eq!(tilemap.fixed(&Cell::new(3, 3)), Some(horizontal));
    assert!(tilemap.is_road(&Cell::new(2, 3)));
    assert!(tilemap.is_road(&Cell::new(4, 3)));
    assert_neighbors_pair(tilemap);
}

#[test]
fn test_world_generation_builds_network() {
    let config = SimulationConfig::with_seed(5);
    let mut world = World::generate(TilemapConfig::city(10, 8, 5), config);
    assert!(world.is_generating());

    let mut ticks = 0;
    while world.is_generating() {
        world.tick(0.05).unwrap();
        ticks += 1;
        assert!(ticks < 100_000, "generation never finished");
    }

    let tilemap = world.tilemap();
    assert!(tilemap.is_solved());
    assert_neighbors_pair(tilemap);
    let road_cells = tilemap.road_cells().len();
    if road_cells > 0 {
        assert!(world.network().node_count() > 0);
    }
}
