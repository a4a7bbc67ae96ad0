use std::process::Command;

fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_tile_traffic"))
        .args(args)
        .env("RUST_LOG", "warn,tile_traffic=info")
        .output()
        .expect("Failed to execute simulation")
}

/// Test that the simulation runs headless without crashing
#[test]
fn test_headless_simulation_runs() {
    let output = run_cli(&["--ticks", "40", "--cars", "10"]);

    assert!(
        output.status.success(),
        "Simulation failed to run. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("=== SIMULATION COMPLETE ==="),
        "Simulation did not complete properly. stdout: {}",
        stdout
    );
}

/// Test that simulation statistics are printed
#[test]
fn test_simulation_statistics_printed() {
    let output = run_cli(&["--ticks", "40", "--cars", "10", "--seed", "7"]);
    assert!(output.status.success(), "Simulation failed to run");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Total cars spawned:"),
        "Missing 'Total cars spawned' statistic"
    );
    assert!(stdout.contains("Success rate:"), "Missing 'Success rate' statistic");
    assert!(stdout.contains("=== World Map ==="), "Missing map output");
}

/// Test that a generated map also runs to completion
#[test]
fn test_generated_map_runs() {
    let output = run_cli(&[
        "--generate", "--width", "10", "--height", "8", "--ticks", "20", "--cars", "5",
    ]);
    assert!(
        output.status.success(),
        "Generated run failed. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("=== SIMULATION COMPLETE ==="));
}
