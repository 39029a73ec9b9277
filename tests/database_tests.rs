//! Database loading from files on disk

use osprobe::network::options::OptionSymbol;
use osprobe::{FingerprintDatabase, OsFamily, ScanError};
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

#[test]
fn test_bundled_database_loads() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/os-fingerprints.db");
    let db = FingerprintDatabase::load(path).unwrap();

    assert_eq!(db.len(), 9);
    let first = db.get(0).unwrap();
    assert_eq!(first.name, "Linux 5.4 - 6.x");
    assert_eq!(first.family(), OsFamily::Linux);
    assert_eq!(first.ttl_guess, Some(0x40));
    assert_eq!(first.opts.window_scale, Some(10));
    assert_eq!(first.window_values, [Some(0xFAF0); 6]);
    assert_eq!(first.df_flag, Some(true));
    assert_eq!(first.t3_responds, Some(true));
    assert!(db.iter().all(|fp| fp.options.is_some()));

    let windows = db.iter().filter(|fp| fp.family() == OsFamily::Windows).count();
    assert_eq!(windows, 3);

    let macos = db.get(8).unwrap();
    assert_eq!(macos.window_values, [None; 6]);
}

#[test]
fn test_load_from_temp_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "# local additions").unwrap();
    writeln!(file, "Fingerprint Ubuntu 22.04").unwrap();
    writeln!(file, "T1(T=40%TG=40%W=FAF0|FFFF%O=M5B4NNSNW7)").unwrap();
    writeln!(file, "T3(R=Y)").unwrap();
    writeln!(file, "Fingerprint Microsoft Windows XP").unwrap();
    writeln!(file, "T1(TG=80%W=FAF0").unwrap();
    file.flush().unwrap();

    let db = FingerprintDatabase::load(file.path()).unwrap();
    assert_eq!(db.len(), 2);

    let ubuntu = &db.entries()[0];
    assert_eq!(ubuntu.family(), OsFamily::Linux);
    assert_eq!(ubuntu.window, Some(0xFAF0));
    assert_eq!(ubuntu.t3_responds, Some(true));
    assert_eq!(ubuntu.t2_responds, None);
    assert_eq!(
        ubuntu.opts.pattern,
        vec![
            OptionSymbol::Mss,
            OptionSymbol::Nop,
            OptionSymbol::Nop,
            OptionSymbol::Sack,
            OptionSymbol::Nop,
            OptionSymbol::WindowScale,
        ]
    );

    // unterminated section still yields its fields
    let xp = &db.entries()[1];
    assert_eq!(xp.ttl_guess, Some(0x80));
    assert_eq!(xp.window, Some(0xFAF0));
}

#[test]
fn test_invalid_utf8_does_not_stop_loading() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"Fingerprint Linux \xff\xfe build\nT1(TG=40)\nFingerprint Linux 2\n")
        .unwrap();
    file.flush().unwrap();

    let db = FingerprintDatabase::load(file.path()).unwrap();
    assert_eq!(db.len(), 2);
    assert_eq!(db.entries()[0].ttl_guess, Some(0x40));
}

#[test]
fn test_missing_file_reports_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = FingerprintDatabase::load(dir.path().join("absent.db")).unwrap_err();
    assert!(matches!(err, ScanError::IoError(_)));
}
