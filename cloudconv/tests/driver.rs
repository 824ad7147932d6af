//! End-to-end conversions through the driver

use cloudconv::{resolve_destination, ConversionDriver, ConvertError, Destination};
use cloudconv_core::{NoProgress, ScalarArray, ScalarType, Stage};
use cloudconv_io::CodecRegistry;
use std::fs;
use std::path::Path;

fn write_pts(path: &Path) {
    let mut content = String::from("X Y Z Intensity R G B\n10\n");
    for i in 0..10 {
        content.push_str(&format!("{} {} {} {} {} {} {}\n", i, i * 2, i * 3, i * 10, 200, i, 0));
    }
    fs::write(path, content).unwrap();
}

#[test]
fn test_chain_through_every_file_format() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("scan.pts");
    write_pts(&source);

    let driver = ConversionDriver::default();
    let mut sink = NoProgress;
    let mut current = source;
    for name in ["scan.las", "scan.e57", "scan.pcd", "scan.ply", "back.pts"] {
        let target = dir.path().join(name);
        let report = driver
            .convert(&current, &Destination::File(target.clone()), &mut sink)
            .unwrap();
        assert_eq!(report.points, Some(10), "converting into {}", name);
        current = target;
    }

    let model = driver.read(&current, &mut sink).unwrap();
    assert_eq!(model.len(), 10);
    let point = model.point(9).unwrap();
    assert!((point[0] - 9.0).abs() < 1e-3);
    assert!((point[1] - 18.0).abs() < 1e-3);
    assert!((point[2] - 27.0).abs() < 1e-3);
}

#[test]
fn test_resolved_destination_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("scan.pts");
    write_pts(&source);

    let driver = ConversionDriver::default();
    let destination = resolve_destination(&source, None, Some(".pcd"), false, driver.registry()).unwrap();
    assert_eq!(destination, Destination::File(dir.path().join("scan.pcd")));

    let mut reports = Vec::new();
    {
        let mut sink = |stage: Stage, fraction: f32| reports.push((stage, fraction));
        driver.convert(&source, &destination, &mut sink).unwrap();
    }
    assert!(reports.contains(&(Stage::Read, 1.0)));
    assert!(reports.contains(&(Stage::Write, 1.0)));

    let mut sink = NoProgress;
    let model = driver.read(destination.path(), &mut sink).unwrap();
    assert_eq!(model.colors().scalar_type(), ScalarType::U8);
    assert_eq!(model.color(3), Some([200.0, 3.0, 0.0]));

    // The output exists now, a second resolution without --unsafe refuses it
    let again = resolve_destination(&source, None, Some(".pcd"), false, &CodecRegistry::default());
    assert!(matches!(again, Err(ConvertError::InvalidArguments(_))));
}

#[test]
fn test_missing_source_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let driver = ConversionDriver::default();
    let mut sink = NoProgress;
    let result = driver.convert(
        &dir.path().join("missing.las"),
        &Destination::File(dir.path().join("out.ply")),
        &mut sink,
    );
    assert!(matches!(result, Err(ConvertError::Codec(_))));
    assert!(!dir.path().join("out.ply").exists());
}

#[cfg(unix)]
fn install_converter(directory: &Path, script: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    fs::create_dir_all(directory).unwrap();
    let path = directory.join("PotreeConverter");
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

// Every process-spawning check lives in this one test so no other thread
// forks while a script is open for writing
#[cfg(unix)]
#[test]
fn test_potree_conversion_with_stub_converter() {
    let dir = tempfile::tempdir().unwrap();
    let tools = dir.path().join("tools").join("bin");
    install_converter(
        &tools,
        "#!/bin/sh\n\
         echo \"reading $1\"\n\
         echo \"[ 25%, 1s]\"\n\
         echo \"noise on stderr\" >&2\n\
         echo \"[100%, 2s]\"\n\
         mkdir -p \"$3\"\n\
         echo \"$1\" > \"$3/input.txt\"\n",
    );

    let source = dir.path().join("scan.pts");
    write_pts(&source);
    let driver = ConversionDriver::default().with_potree_path(dir.path().join("tools"));

    // Non-LAS sources go through an intermediate LAS file
    let target = dir.path().join("scan_potree");
    let mut reports = Vec::new();
    let report = {
        let mut sink = |stage: Stage, fraction: f32| reports.push((stage, fraction));
        driver
            .convert(&source, &Destination::Potree(target.clone()), &mut sink)
            .unwrap()
    };
    assert_eq!(report.points, Some(10));
    assert!(reports.contains(&(Stage::Tree, 0.25)));
    assert_eq!(reports.last(), Some(&(Stage::Tree, 1.0)));

    let intermediate = fs::read_to_string(target.join("input.txt")).unwrap();
    let intermediate = Path::new(intermediate.trim());
    assert_eq!(intermediate.extension().and_then(|e| e.to_str()), Some("las"));
    assert!(!intermediate.exists());

    // LAS sources are handed over directly
    let las_source = dir.path().join("scan.las");
    let mut sink = NoProgress;
    driver
        .convert(&source, &Destination::File(las_source.clone()), &mut sink)
        .unwrap();
    let las_target = dir.path().join("direct_potree");
    let report = driver
        .convert(&las_source, &Destination::Potree(las_target.clone()), &mut sink)
        .unwrap();
    assert_eq!(report.points, None);
    let passed = fs::read_to_string(las_target.join("input.txt")).unwrap();
    assert_eq!(Path::new(passed.trim()), las_source);

    // A failing converter still cleans up the intermediate file
    let failing = dir.path().join("failing");
    install_converter(
        &failing,
        "#!/bin/sh\nmkdir -p \"$3\"\necho \"$1\" > \"$3/input.txt\"\nexit 3\n",
    );
    let driver = ConversionDriver::default().with_potree_path(&failing);
    let failed_target = dir.path().join("failed_potree");
    let result = driver.convert(&source, &Destination::Potree(failed_target.clone()), &mut sink);
    assert!(matches!(result, Err(ConvertError::ToolFailed(_))));
    let intermediate = fs::read_to_string(failed_target.join("input.txt")).unwrap();
    assert!(!Path::new(intermediate.trim()).exists());

    // Output that is not UTF-8 still counts as progress and the input stays
    // in place until the converter exits
    let garbled = dir.path().join("garbled");
    install_converter(
        &garbled,
        "#!/bin/sh\n\
         printf 'progress \\377 60%%\\n'\n\
         sleep 1\n\
         mkdir -p \"$3\"\n\
         if [ -f \"$1\" ]; then echo present > \"$3/input.txt\"; fi\n",
    );
    let driver = ConversionDriver::default().with_potree_path(&garbled);
    let garbled_target = dir.path().join("garbled_potree");
    let mut reports = Vec::new();
    {
        let mut sink = |stage: Stage, fraction: f32| reports.push((stage, fraction));
        driver
            .convert(&source, &Destination::Potree(garbled_target.clone()), &mut sink)
            .unwrap();
    }
    assert!(reports.contains(&(Stage::Tree, 0.6)));
    let seen = fs::read_to_string(garbled_target.join("input.txt")).unwrap();
    assert_eq!(seen.trim(), "present");
}
