//! End-to-end Agile-encrypted save/reopen scenarios.

use xlsxcore::crypto::{Algorithm, EncryptionOptions};
use xlsxcore::model::Workbook;

fn sample_workbook() -> Workbook {
    let mut wb = Workbook::new();
    let idx = wb.add_sheet("Sheet1").unwrap();
    let sheet = wb.get_sheet_mut(idx).unwrap();
    sheet.cell(0, 0).unwrap().set_text("secret");
    sheet.cell(0, 1).unwrap().set_number(7.0);
    wb
}

#[test]
fn encrypted_workbook_round_trips_with_the_correct_password() {
    let wb = sample_workbook();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("protected.xlsx");
    wb.save_encrypted(&path, EncryptionOptions::new("benchmark123")).unwrap();

    let reopened = Workbook::open(&path, Some("benchmark123")).unwrap();
    let sheet = reopened.get_sheet(0).unwrap();
    assert_eq!(sheet.get_cell(0, 0).unwrap().value().as_text(), "secret");
    assert_eq!(sheet.get_cell(0, 1).unwrap().value().as_number(), 7.0);
}

#[test]
fn wrong_password_is_rejected_without_exposing_plaintext() {
    let wb = sample_workbook();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("protected.xlsx");
    wb.save_encrypted(&path, EncryptionOptions::new("correct horse")).unwrap();

    let err = Workbook::open(&path, Some("wrong password")).unwrap_err();
    assert!(matches!(err, xlsxcore::Error::IncorrectPassword));
}

#[test]
fn missing_password_on_an_encrypted_file_is_rejected() {
    let wb = sample_workbook();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("protected.xlsx");
    wb.save_encrypted(&path, EncryptionOptions::new("correct horse")).unwrap();

    let err = Workbook::open(&path, None).unwrap_err();
    assert!(matches!(err, xlsxcore::Error::PasswordRequired));
}

#[test]
fn aes256_spin_count_thousand_round_trips_a_large_buffer() {
    use xlsxcore::crypto::{decrypt_agile, encrypt_agile};

    let plaintext: Vec<u8> = (0..1024 * 1024).map(|i| (i % 256) as u8).collect();
    let options = EncryptionOptions::new("benchmark123")
        .with_algorithm(Algorithm::Aes256)
        .with_spin_count(1000);

    let envelope = encrypt_agile(&plaintext, &options).unwrap();
    assert!(xlsxcore::cfb::is_cfb_file(&xlsxcore::cfb::build_encrypted_package_cfb(
        &envelope.encryption_info,
        &envelope.encrypted_package
    )
    .unwrap()));

    let decrypted = decrypt_agile(&envelope.encryption_info, &envelope.encrypted_package, "benchmark123").unwrap();
    assert_eq!(decrypted, plaintext);
}
