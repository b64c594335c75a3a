#![cfg(test)]

use std::fs::{self, DirEntry};
use std::io;
use std::path::{Path, PathBuf};

use crate::replay::Replay;

fn visit_dirs(dir: &Path, cb: &mut dyn FnMut(&DirEntry)) -> io::Result<()> {
    if dir.is_dir() {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                visit_dirs(&path, cb)?;
            } else {
                cb(&entry);
            }
        }
    }
    Ok(())
}

fn check(path: &Path) -> Result<(), String> {
    let source = fs::read_to_string(path).map_err(|err| err.to_string())?;
    let fail = |err: crate::TraceError| format!("{}: {}", path.display(), err);
    let graph = crate::reconstruct(&source).map_err(fail)?;
    let mut replay = Replay::new(graph).map_err(fail)?;
    replay.run_to_end().map_err(fail)?;

    let graph = replay.graph();
    if let Some(id) = graph.refs().find(|&id| !graph.ref_done(id)) {
        return Err(format!(
            "{}: ref at {} was not fully replayed",
            path.display(),
            graph.expand_ref(id).first_location()
        ));
    }
    Ok(())
}

#[test]
fn replay_all_traces() -> Result<(), String> {
    let mut d = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    d.push("tests");
    d.push("traces");
    let mut result = Ok(());
    let mut seen = 0;
    visit_dirs(&d, &mut |entry| {
        if !matches!(
            entry.path().extension().map(|x| x.to_str()),
            Some(Some("trace"))
        ) {
            return;
        }
        seen += 1;
        result = result.clone().and(check(&entry.path()));
    })
    .unwrap();
    assert!(seen > 0, "no traces under {}", d.display());
    result
}
