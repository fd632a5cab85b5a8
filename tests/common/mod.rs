#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Writes an executable `/bin/sh` script standing in for an external tool.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Lines a mock wrote with `printf '%s\n' "$@" > file`.
pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

/// A toolchain that records its arguments and the build directory contents,
/// produces the artifact and exits with `code`.
pub fn mock_toolchain(dir: &Path, record_dir: &Path, code: i32) -> PathBuf {
    let body = r#"
out=""
for arg in "$@"; do
  case "$arg" in
    build.path=*) out="${arg#build.path=}" ;;
  esac
done
printf '%s\n' "$@" > "@RECORD@/args"
ls -A "$out" > "@RECORD@/contents"
echo "INFO Loading configuration"
echo "DEBUG Using board teensy35"
echo "Sketch uses 1234 bytes"
echo "warning: unused variable" 1>&2
if [ @CODE@ -eq 0 ]; then
  : > "$out/low_level.ino.hex"
fi
exit @CODE@
"#
    .replace("@RECORD@", &record_dir.display().to_string())
    .replace("@CODE@", &code.to_string());
    fs::create_dir_all(record_dir).unwrap();
    write_script(dir, "arduino_debug", &body)
}

/// A project directory containing `low_level.ino`.
pub fn project_dir(root: &Path) -> PathBuf {
    let project = root.join("low_level");
    fs::create_dir_all(&project).unwrap();
    fs::write(project.join("low_level.ino"), "void setup() {}\nvoid loop() {}\n").unwrap();
    project
}
