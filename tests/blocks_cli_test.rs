use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn blocks_lists_path_headed_fences() {
    let tmp = tempdir().expect("tempdir");
    let result = tmp.path().join("result.txt");
    fs::write(
        &result,
        "## Backend\n\n#### `backend/app/main.py`\n```python\nprint('hi')\n```\n\n**`schema.sql`**\n```sql\nCREATE TABLE tasks (id INT);\n",
    )
    .expect("write result");

    assert_cmd::cargo::cargo_bin_cmd!("stitch")
        .current_dir(tmp.path())
        .env("STITCH_HOME", tmp.path().join("stitch"))
        .arg("blocks")
        .arg(&result)
        .assert()
        .success()
        .stdout(predicate::str::contains("blocks=2"))
        .stdout(predicate::str::contains(
            "block[0] lang=python path=backend/app/main.py lines=1 truncated=false",
        ))
        .stdout(predicate::str::contains(
            "block[1] lang=sql path=schema.sql lines=1 truncated=true",
        ));
}

#[test]
fn blocks_fails_for_missing_file() {
    let tmp = tempdir().expect("tempdir");

    assert_cmd::cargo::cargo_bin_cmd!("stitch")
        .current_dir(tmp.path())
        .arg("blocks")
        .arg(tmp.path().join("nope.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}
