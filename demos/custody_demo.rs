/// Walkthrough of a case from intake to report
///
/// Catalogs a small evidence directory, records custody transfers, detects
/// tampering on a verification pass and prints the resulting report.
use chainkeep_core::forensics::{write_hash_sidecar, write_metadata_sidecar, AcquisitionMetadata};
use chainkeep_core::{CaseSession, CustodyConfig, HashAlgorithm, VerifyOptions};
use std::fs;
use tempfile::TempDir;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔒 Chainkeep Custody Demo");
    println!("=========================\n");

    let temp_dir = TempDir::new()?;
    let evidence = temp_dir.path().join("evidence");
    let store = temp_dir.path().join("cases");
    fs::create_dir_all(evidence.join("mail"))?;

    fs::write(evidence.join("disk.dd"), vec![0x5a; 64 * 1024])?;
    fs::write(evidence.join("mail/inbox.mbox"), b"From: suspect@example.com\n")?;
    fs::write(evidence.join("notes.txt"), b"seized 09:14, sealed bag 4411")?;
    fs::write(evidence.join(".DS_Store"), b"ignored")?;

    // ===================================================================
    // PART 1: INTAKE
    // ===================================================================
    println!("📥 Part 1: Intake");
    println!("-----------------\n");

    let mut session = CaseSession::initialize(
        "CASE-2026-001",
        "Det. J. Rivera",
        &evidence,
        Some("Laptop seized at 14 Harbor St".to_string()),
        CustodyConfig::default(),
        &store,
    )?;

    for item in session.record().catalog.items() {
        println!(
            "   #{} {:<20} {:>8} bytes  {}",
            item.id,
            item.relative_path.display(),
            item.size,
            item.hash
        );
    }
    println!("💾 Snapshot: {}\n", session.snapshot_path().display());

    // Acquisition tooling normally leaves these next to the image
    let disk = session.record().catalog.items()[0].clone();
    write_hash_sidecar(&disk.absolute_path, &disk.hash)?;
    write_metadata_sidecar(
        &disk.absolute_path,
        &AcquisitionMetadata::new(disk.size, "dd 9.4"),
    )?;
    let sidecars = session.check_item_sidecars(disk.id, None)?;
    println!(
        "🔍 Sidecars for {}: {}\n",
        disk.filename,
        if sidecars.passed() { "passed" } else { "failed" }
    );

    // ===================================================================
    // PART 2: CUSTODY
    // ===================================================================
    println!("🤝 Part 2: Custody");
    println!("------------------\n");

    session.add_custody_entry(
        "Transferred to forensic lab",
        "Det. J. Rivera",
        Some("Evidence locker 3 to lab intake".to_string()),
    )?;
    session.add_custody_entry("Received at forensic lab", "A. Chen", None)?;
    let strong = session.compute_digest(disk.id, HashAlgorithm::SHA256, "A. Chen")?;
    println!("🔐 {} {}", disk.filename, strong);

    let outcome = session.verify("A. Chen", &VerifyOptions::from_config(session.config()))?;
    println!("✅ {}\n", outcome.summary());

    // ===================================================================
    // PART 3: TAMPERING
    // ===================================================================
    println!("⚠️  Part 3: Tampering");
    println!("--------------------\n");

    fs::write(evidence.join("notes.txt"), b"seized 09:41, sealed bag 4411")?;
    fs::remove_file(evidence.join("mail/inbox.mbox"))?;

    let outcome = session.verify("A. Chen", &VerifyOptions::from_config(session.config()))?;
    println!("❌ {}", outcome.summary());
    for issue in &outcome.issues {
        println!("   - {}", issue);
    }
    println!();

    // ===================================================================
    // PART 4: REPORT
    // ===================================================================
    println!("{}", session.report().render_text());

    Ok(())
}
