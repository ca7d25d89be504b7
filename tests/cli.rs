use std::fs;

use assert_cmd::Command;

fn binary() -> Command {
    Command::cargo_bin("otsu-binarize").unwrap()
}

#[test]
fn test_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.raw");
    fs::write(&input, [0_u8; 4]).unwrap();
    let assert = binary()
        .arg(&input).arg("2").arg("2")
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("Usage"), "{}", stderr);
}

#[test]
fn test_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.raw");
    let assert = binary()
        .arg(dir.path().join("absent.raw")).arg("4").arg("4").arg(&output)
        .args(["--workers", "3"])
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("absent.raw"), "{}", stderr);
    assert!(!output.exists());
}

#[test]
fn test_binarizes_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.raw");
    let output = dir.path().join("out.raw");
    let pixels: Vec<u8> = (0..64).map(|i| if i % 2 == 0 { 30 } else { 220 }).collect();
    fs::write(&input, &pixels).unwrap();

    for mode in ["distributed", "threaded", "serial"] {
        let assert = binary()
            .arg(&input).arg("8").arg("8").arg(&output)
            .args(["--workers", "4", "--mode", mode, "--timing"])
            .assert()
            .success();
        let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
        assert!(stdout.contains("Calculated Otsu threshold: 30"), "{}", stdout);
        assert!(stdout.contains("Total Execution Time:"), "{}", stdout);

        let written = fs::read(&output).unwrap();
        let expected: Vec<u8> = pixels.iter().map(|&p| if p > 30 { 255 } else { 0 }).collect();
        assert_eq!(written, expected, "mode {}", mode);
    }
}
