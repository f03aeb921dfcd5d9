mod common;

use std::fs;

use pretty_assertions::assert_eq;

use common::xls_fixture_builder::{
    build_cryptoapi_encrypted_xls, build_non_biff_xls, build_plain_xls, build_rc4_encrypted_xls,
    build_xor_obfuscated_xls, read_stream, read_workbook_stream, SUMMARY_BYTES, SUMMARY_STREAM,
};
use common::xlsx_fixture_builder::{
    build_ole_without_encryption, build_plain_xlsx, encrypt_xlsx, read_zip_entry,
};
use common::{file_names, write_file};
use xlunlock::{
    unlock, unlock_directory, CollisionPolicy, FormatVariant, SkipReason, UnlockConfig,
    UnlockErrorKind,
};

const PASSWORD: &str = "12345";

#[test]
fn encrypted_xlsx_is_decrypted_to_the_original_package() {
    let tmp = tempfile::tempdir().expect("temp dir");
    let plain = build_plain_xlsx();
    let source = write_file(tmp.path(), "book.xlsx", &encrypt_xlsx(&plain, PASSWORD));
    let original_source = fs::read(&source).expect("read source");

    let report = unlock_directory(tmp.path(), PASSWORD).expect("unlock");

    assert_eq!(report.processed_count(), 1);
    let unlocked = &report.unlocked[0];
    assert_eq!(unlocked.source, source);
    assert_eq!(unlocked.output, tmp.path().join("book_unlocked.xlsx"));
    assert_eq!(unlocked.format, FormatVariant::OpenXml);

    let output = fs::read(&unlocked.output).expect("read output");
    assert_eq!(output, plain);
    assert!(read_zip_entry(&output, "xl/workbook.xml").contains("Sheet1"));
    assert_eq!(fs::read(&source).expect("reread source"), original_source);
}

#[test]
fn encrypted_xls_gets_a_plaintext_workbook_stream() {
    let tmp = tempfile::tempdir().expect("temp dir");
    let rc4 = build_rc4_encrypted_xls(PASSWORD);
    let cryptoapi = build_cryptoapi_encrypted_xls(PASSWORD, 128);
    write_file(tmp.path(), "a_rc4.xls", &rc4.xls);
    write_file(tmp.path(), "b_cryptoapi.xls", &cryptoapi.xls);

    let report = unlock_directory(tmp.path(), PASSWORD).expect("unlock");
    assert_eq!(report.processed_count(), 2);
    assert!(report
        .unlocked
        .iter()
        .all(|file| file.format == FormatVariant::LegacyBinary));

    let rc4_out = fs::read(tmp.path().join("a_rc4_unlocked.xls")).expect("rc4 output");
    assert_eq!(read_workbook_stream(&rc4_out), rc4.expected_decrypted_stream);
    assert_eq!(read_stream(&rc4_out, SUMMARY_STREAM), SUMMARY_BYTES);

    let capi_out = fs::read(tmp.path().join("b_cryptoapi_unlocked.xls")).expect("capi output");
    assert_eq!(
        read_workbook_stream(&capi_out),
        cryptoapi.expected_decrypted_stream
    );
}

#[test]
fn unencrypted_and_unrelated_files_are_skipped() {
    let tmp = tempfile::tempdir().expect("temp dir");
    write_file(tmp.path(), "plain.xlsx", &build_plain_xlsx());
    write_file(tmp.path(), "plain.xls", &build_plain_xls());
    write_file(tmp.path(), "notes.txt", b"hello");
    write_file(tmp.path(), "SHOUTY.XLSX", &build_plain_xlsx());
    fs::create_dir(tmp.path().join("nested.xlsx")).expect("create subdir");

    let report = unlock_directory(tmp.path(), PASSWORD).expect("unlock");

    assert_eq!(report.processed_count(), 0);
    assert!(report.failed.is_empty());
    assert_eq!(report.skipped_count(), 5);
    assert_eq!(report.skipped_for(SkipReason::NotEncrypted).count(), 2);
    assert_eq!(
        report.skipped_for(SkipReason::UnrecognizedExtension).count(),
        2
    );
    let not_regular: Vec<_> = report.skipped_for(SkipReason::NotRegularFile).collect();
    assert_eq!(not_regular.len(), 1);
    assert_eq!(not_regular[0].path, tmp.path().join("nested.xlsx"));

    assert_eq!(
        file_names(tmp.path()),
        vec!["SHOUTY.XLSX", "nested.xlsx", "notes.txt", "plain.xls", "plain.xlsx"]
    );
}

#[test]
fn wrong_password_stops_the_run_and_leaves_nothing_behind() {
    let tmp = tempfile::tempdir().expect("temp dir");
    write_file(
        tmp.path(),
        "book.xlsx",
        &encrypt_xlsx(&build_plain_xlsx(), "correct horse"),
    );

    let err = unlock_directory(tmp.path(), PASSWORD).expect_err("wrong password");
    assert_eq!(err.kind, UnlockErrorKind::WrongPassword);
    assert_eq!(err.path, tmp.path().join("book.xlsx"));
    assert!(err.to_string().contains("book.xlsx"), "{err}");
    assert_eq!(file_names(tmp.path()), vec!["book.xlsx"]);
}

#[test]
fn wrong_password_on_xls_is_reported_the_same_way() {
    let tmp = tempfile::tempdir().expect("temp dir");
    write_file(tmp.path(), "book.xls", &build_rc4_encrypted_xls("other").xls);

    let err = unlock_directory(tmp.path(), PASSWORD).expect_err("wrong password");
    assert_eq!(err.kind, UnlockErrorKind::WrongPassword);
    assert_eq!(file_names(tmp.path()), vec!["book.xls"]);
}

#[test]
fn second_run_is_idempotent() {
    let tmp = tempfile::tempdir().expect("temp dir");
    write_file(
        tmp.path(),
        "book.xlsx",
        &encrypt_xlsx(&build_plain_xlsx(), PASSWORD),
    );

    let first = unlock_directory(tmp.path(), PASSWORD).expect("first run");
    assert_eq!(first.processed_count(), 1);

    let second = unlock_directory(tmp.path(), PASSWORD).expect("second run");
    assert_eq!(second.processed_count(), 0);
    assert_eq!(second.skipped_for(SkipReason::OutputExists).count(), 1);
    // The earlier output is a plain package, so it is skipped rather than unlocked again.
    assert_eq!(second.skipped_for(SkipReason::NotEncrypted).count(), 1);
    assert_eq!(
        file_names(tmp.path()),
        vec!["book.xlsx", "book_unlocked.xlsx"]
    );
}

#[test]
fn collision_policies() {
    let tmp = tempfile::tempdir().expect("temp dir");
    let plain = build_plain_xlsx();
    write_file(tmp.path(), "book.xlsx", &encrypt_xlsx(&plain, PASSWORD));
    let existing = write_file(tmp.path(), "book_unlocked.xlsx", b"sentinel");

    let mut config = UnlockConfig::new(tmp.path(), PASSWORD);
    config.collision = CollisionPolicy::Fail;
    let err = unlock(&config).expect_err("collision");
    assert_eq!(err.kind, UnlockErrorKind::OutputCollision);
    assert_eq!(fs::read(&existing).expect("read existing"), b"sentinel");

    config.collision = CollisionPolicy::Skip;
    let report = unlock(&config).expect("skip");
    assert_eq!(report.skipped_for(SkipReason::OutputExists).count(), 1);
    assert_eq!(fs::read(&existing).expect("read existing"), b"sentinel");

    config.collision = CollisionPolicy::Overwrite;
    let report = unlock(&config).expect("overwrite");
    assert_eq!(report.processed_count(), 1);
    assert_eq!(fs::read(&existing).expect("read existing"), plain);
}

#[test]
fn keep_going_collects_every_failure() {
    let tmp = tempfile::tempdir().expect("temp dir");
    write_file(tmp.path(), "a_good.xlsx", &encrypt_xlsx(&build_plain_xlsx(), PASSWORD));
    write_file(tmp.path(), "b_wrong.xls", &build_rc4_encrypted_xls("other").xls);
    write_file(tmp.path(), "c_xor.xls", &build_xor_obfuscated_xls());
    write_file(tmp.path(), "d_broken.xls", &build_non_biff_xls());
    write_file(tmp.path(), "e_garbage.xls", b"not a compound file at all");
    write_file(tmp.path(), "f_bare_ole.xlsx", &build_ole_without_encryption());

    let mut config = UnlockConfig::new(tmp.path(), PASSWORD);
    config.fail_fast = false;
    let report = unlock(&config).expect("run completes");

    assert_eq!(report.processed_count(), 1);
    let kinds: Vec<_> = report
        .failed
        .iter()
        .map(|failed| {
            (
                failed
                    .path
                    .file_name()
                    .expect("file name")
                    .to_string_lossy()
                    .into_owned(),
                failed.kind,
            )
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("b_wrong.xls".to_string(), UnlockErrorKind::WrongPassword),
            ("c_xor.xls".to_string(), UnlockErrorKind::UnsupportedEncryption),
            ("d_broken.xls".to_string(), UnlockErrorKind::StructuralParse),
            ("e_garbage.xls".to_string(), UnlockErrorKind::StructuralParse),
            ("f_bare_ole.xlsx".to_string(), UnlockErrorKind::StructuralParse),
        ]
    );
    assert!(tmp.path().join("a_good_unlocked.xlsx").is_file());
    assert!(!tmp.path().join("b_wrong_unlocked.xls").exists());
}

#[test]
fn fail_fast_stops_before_later_files() {
    let tmp = tempfile::tempdir().expect("temp dir");
    write_file(tmp.path(), "a_broken.xls", b"garbage");
    write_file(tmp.path(), "b_good.xlsx", &encrypt_xlsx(&build_plain_xlsx(), PASSWORD));

    let err = unlock_directory(tmp.path(), PASSWORD).expect_err("fail fast");
    assert_eq!(err.kind, UnlockErrorKind::StructuralParse);
    assert!(!tmp.path().join("b_good_unlocked.xlsx").exists());
}

#[test]
fn missing_directory_is_a_filesystem_error() {
    let tmp = tempfile::tempdir().expect("temp dir");
    let missing = tmp.path().join("does-not-exist");

    let err = unlock_directory(&missing, PASSWORD).expect_err("missing dir");
    assert_eq!(err.kind, UnlockErrorKind::Filesystem);
    assert_eq!(err.path, missing);
}

#[test]
fn configured_extensions_limit_the_scan() {
    let tmp = tempfile::tempdir().expect("temp dir");
    write_file(tmp.path(), "book.xlsm", &encrypt_xlsx(&build_plain_xlsx(), PASSWORD));
    write_file(tmp.path(), "legacy.xls", &build_rc4_encrypted_xls(PASSWORD).xls);

    let mut config = UnlockConfig::new(tmp.path(), PASSWORD);
    config.extensions = vec!["xlsm".to_string()];
    let report = unlock(&config).expect("unlock");

    assert_eq!(report.processed_count(), 1);
    assert_eq!(
        report.unlocked[0].output,
        tmp.path().join("book_unlocked.xlsm")
    );
    assert_eq!(
        report.skipped_for(SkipReason::UnrecognizedExtension).count(),
        1
    );
}
