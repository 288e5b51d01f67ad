// CLI integration tests: the param -> edit -> montq workflow end to end
// against the built binary.

use std::fs;
use std::path::Path;
use std::process::Command;

const DELIM: &str = "@#$#@#$#@";

fn fixture_model() -> String {
    let widgets = "\
BUTTON
19
10
85
43
setup
setup
NIL
1
T
OBSERVER
NIL
NIL
NIL
NIL
1

BUTTON
19
50
85
83
go
go
T
1
T
OBSERVER
NIL
NIL
NIL
NIL
1

SLIDER
10
100
180
133
population
population
0
100
50.0
1
1
NIL
HORIZONTAL

SWITCH
10
140
180
173
wrap?
wrap?
0
1
-1000

MONITOR
10
230
120
275
turtles
count turtles
2
1
11
";

    let behav = "\
<experiments>
  <experiment name=\"sweep\" repetitions=\"1\">
    <setup>setup</setup>
    <go>go</go>
    <timeLimit steps=\"100\"/>
    <steppedValueSet variable=\"population\" first=\"0\" step=\"25\" last=\"100\"/>
    <enumeratedValueSet variable=\"wrap?\">
      <value value=\"true\"/>
      <value value=\"false\"/>
    </enumeratedValueSet>
  </experiment>
</experiments>
";

    [
        "to setup end\nto go end\n",
        widgets,
        "info\n",
        "\n",
        "6.2.0\n",
        "\n",
        "\n",
        behav,
        "\n",
        "\n",
        "\n",
        "\n",
    ]
    .join(&format!("{}\n", DELIM))
}

fn write_fixture(dir: &Path) -> std::path::PathBuf {
    let model = dir.join("model.nlogo");
    fs::write(&model, fixture_model()).unwrap();
    model
}

fn nlbatch() -> Command {
    Command::new(env!("CARGO_BIN_EXE_nlbatch"))
}

#[test]
fn param_writes_editable_table() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_fixture(dir.path());
    let out = dir.path().join("params.csv");

    let output = nlbatch()
        .arg(&model)
        .arg("param")
        .arg(&out)
        .output()
        .expect("failed to run nlbatch");
    assert!(
        output.status.success(),
        "param failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let table = fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines[0], "parameter,type,setting,minimum,maximum");
    assert!(lines.contains(&"population,numeric,50,0,100"));
    assert!(lines.contains(&"wrap?,boolean,true,true,false"));
}

#[test]
fn expts_lists_behaviorspace_experiments() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_fixture(dir.path());

    let output = nlbatch().arg(&model).arg("expts").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Experiments:"), "stdout: {}", stdout);
    // 5 population values x 2 wrap? values
    assert!(stdout.contains("sweep (10 runs)"), "stdout: {}", stdout);
}

#[test]
fn montq_writes_documents_scripts_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_fixture(dir.path());
    let params = dir.path().join("params.csv");
    let launch = dir.path().join("launch.yaml");

    // Extract, then "edit" the table programmatically.
    assert!(nlbatch()
        .arg(&model)
        .arg("param")
        .arg(&params)
        .status()
        .unwrap()
        .success());

    // Small limits so 12 samples exercise splitting and the sleeper.
    fs::write(
        &launch,
        "max_doc_entries: 10\ndoc_group_size: 5\ntask_array_limit: 5\n",
    )
    .unwrap();

    let out_xml = dir.path().join("out.xml");
    let out_script = dir.path().join("job.sh");
    let output = nlbatch()
        .arg(&model)
        .arg("--seed")
        .arg("7")
        .arg("--launch")
        .arg(&launch)
        .arg("montq")
        .arg(&params)
        .arg("1000")
        .arg("12")
        .arg(&out_xml)
        .arg(&out_script)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "montq failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("12 runs in 3 document(s), array of 5"),
        "stdout: {}",
        stdout
    );

    for doc in ["out-1.xml", "out-2.xml", "out-3.xml"] {
        assert!(dir.path().join(doc).exists(), "missing {}", doc);
    }
    assert!(out_script.exists());
    assert!(dir.path().join("job-sleeper.sh").exists());

    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("expansion_summary.json")).unwrap())
            .unwrap();
    assert_eq!(summary["runs"], 12);
    assert_eq!(summary["seed"], 7);
    assert_eq!(summary["experiment_prefix"], "x-");
    assert_eq!(summary["documents"].as_array().unwrap().len(), 3);
    assert!(summary["sleeper_script"].as_str().unwrap().contains("job-sleeper.sh"));

    // The experiment documents hold the sampled runs in order.
    let first_doc = fs::read_to_string(dir.path().join("out-1.xml")).unwrap();
    assert!(first_doc.contains("<experiment name=\"x-01\""));
    assert!(first_doc.contains("enumeratedValueSet variable=\"population\""));
}

#[test]
fn monte_is_deterministic_for_a_seed() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_fixture(dir.path());
    let params = dir.path().join("params.csv");
    assert!(nlbatch()
        .arg(&model)
        .arg("param")
        .arg(&params)
        .status()
        .unwrap()
        .success());

    let run = |out: &Path| {
        let status = nlbatch()
            .arg(&model)
            .arg("--seed")
            .arg("42")
            .arg("--quiet")
            .arg("monte")
            .arg(&params)
            .arg("500")
            .arg("6")
            .arg(out)
            .status()
            .unwrap();
        assert!(status.success());
        fs::read_to_string(out).unwrap()
    };

    let a = run(&dir.path().join("a.xml"));
    let b = run(&dir.path().join("b.xml"));
    assert_eq!(a, b);
}

#[test]
fn split_expands_named_experiment() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_fixture(dir.path());
    let out_xml = dir.path().join("split.xml");
    let out_script = dir.path().join("split.sh");

    let output = nlbatch()
        .arg(&model)
        .arg("split")
        .arg("sweep")
        .arg(&out_xml)
        .arg(&out_script)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "split failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let experiments = nlbatch::read_experiments(&out_xml).unwrap();
    assert_eq!(experiments.len(), 10);
    assert_eq!(experiments[0].name, "sweep-01");
    assert_eq!(experiments[9].name, "sweep-10");
    assert!(experiments.iter().all(|e| e.stepped.is_empty()));
    assert!(out_script.exists());
}

#[test]
fn missing_experiment_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_fixture(dir.path());

    let output = nlbatch()
        .arg(&model)
        .arg("split")
        .arg("nope")
        .arg(dir.path().join("x.xml"))
        .arg(dir.path().join("x.sh"))
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no experiment named 'nope'"), "stderr: {}", stderr);
}
