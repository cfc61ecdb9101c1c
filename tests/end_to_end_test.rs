use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run_command(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lecture-deck"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

fn write_lecture(dir: &Path) -> String {
    let markdown_content = r#"% Forces

# Forces

Why things move.

## Newton laws

---sldlayout2

## Diagram

![free body](fbd.png)

Each arrow is a force.

---sldbrk

Sum them up.
"#;
    let path = dir.join("forces.md");
    fs::write(&path, markdown_content).expect("Failed to write markdown file");
    path.to_string_lossy().into_owned()
}

#[test]
fn test_segment_command_lists_units() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_lecture(temp_dir.path());

    let output = run_command(&["segment", "-i", &input]);
    assert!(
        output.status.success(),
        "segment command failed: {:?}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        stdout_lines(&output),
        vec![
            "forces\t1\t2",
            "newton-laws\t1\t1",
            "diagram\t2\t3",
            "slide-4\t2\t1"
        ]
    );

    let output = run_command(&["segment", "-i", &input, "--json"]);
    assert!(output.status.success());
    let units: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("segment --json prints JSON");
    assert_eq!(units[2]["id"], "diagram");
    assert_eq!(units[2]["layout"], 2);
    assert_eq!(units[2]["title"], "Diagram");
    assert!(units[3]["title"].is_null());
}

#[test]
fn test_segment_command_honours_break_depths() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = temp_dir.path().join("notes.md");
    fs::write(&input, "Preamble text.\n\n## Section\n\n### Detail\n\nBody.\n")
        .expect("Failed to write markdown file");
    let input = input.to_string_lossy().into_owned();

    let ids = |output: &Output| -> Vec<String> {
        stdout_lines(output)
            .iter()
            .filter_map(|line| line.split('\t').next().map(str::to_string))
            .collect()
    };

    let output = run_command(&["segment", "-i", &input, "--intro-label", "start"]);
    assert!(output.status.success());
    assert_eq!(ids(&output), vec!["start", "section", "detail"]);

    let output = run_command(&[
        "segment",
        "-i",
        &input,
        "--break-depths",
        "2",
        "--intro-label",
        "start",
    ]);
    assert!(output.status.success());
    assert_eq!(ids(&output), vec!["start", "section"]);
}

#[test]
fn test_toc_command() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_lecture(temp_dir.path());

    let output = run_command(&["toc", "-i", &input]);
    assert!(output.status.success());
    assert_eq!(
        stdout_lines(&output),
        vec!["newton-laws\tNewton laws", "diagram\tDiagram"]
    );
}

#[test]
fn test_render_command_writes_both_views() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let base_dir = temp_dir.path();
    let input = write_lecture(base_dir);

    let css_file = base_dir.join("theme.css");
    fs::write(&css_file, "body { font-family: Georgia, serif; }").expect("Failed to write CSS file");
    let css = css_file.to_string_lossy().into_owned();

    let linear_path = base_dir.join("out/linear.html");
    let output = run_command(&[
        "render",
        "-i",
        &input,
        "-o",
        linear_path.to_str().expect("utf-8 path"),
        "--css",
        &css,
    ]);
    assert!(
        output.status.success(),
        "render command failed: {:?}",
        String::from_utf8_lossy(&output.stderr)
    );
    let html = fs::read_to_string(&linear_path).expect("Failed to read HTML file");
    assert!(html.contains("class=\"view-linear static\""));
    assert!(html.contains("font-family: Georgia"), "CSS was not embedded");
    assert!(html.contains("data-heading=\"diagram\""));
    assert!(!html.contains("data-session-port"));

    let deck_path = base_dir.join("deck.html");
    let output = run_command(&[
        "render",
        "-i",
        &input,
        "-o",
        deck_path.to_str().expect("utf-8 path"),
        "--view",
        "paginated",
        "--css",
        &css,
        "--mode",
        "link",
    ]);
    assert!(output.status.success());
    let html = fs::read_to_string(&deck_path).expect("Failed to read HTML file");
    assert!(html.contains("class=\"view-paginated static\""));
    assert!(html.contains("<span class=\"deck-counter\">1/4</span>"));
    assert!(html.contains(&format!("<link rel=\"stylesheet\" href=\"{}\">", css)));
    // Static decks keep every unit visible for printing
    assert!(!html.contains(" hidden>"));
    assert!(!html.contains("---sld"));
}

#[test]
fn test_invalid_input_fails_with_message() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_lecture(temp_dir.path());
    let out = temp_dir.path().join("x.html");
    let out = out.to_str().expect("utf-8 path");

    let output = run_command(&["render", "-i", &input, "-o", out, "--view", "slides"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));

    let output = run_command(&["render", "-i", &input, "-o", out, "--mode", "inline"]);
    assert!(!output.status.success());

    let missing = temp_dir.path().join("missing.md");
    let output = run_command(&["toc", "-i", missing.to_str().expect("utf-8 path")]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing.md"));
}
