use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use chainkeep_core::forensics::{
	check_sidecars, check_sidecars_in_dir, CheckStatus, DirectoryCheck, SidecarReport,
};
use chainkeep_core::{
	CaseRegistry, CaseSession, CustodyConfig, CustodyError, HashAlgorithm, ScanProgress,
	VerifyOptions, VerifyProgress,
};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chainkeep", version, about = "Chainkeep - Digital Evidence Chain of Custody")]
struct Cli {
	/// Directory holding case snapshots
	#[arg(long, global = true, default_value = ".")]
	store_dir: PathBuf,
	/// JSON configuration file
	#[arg(long, global = true)]
	config: Option<PathBuf>,
	/// Case registry database (default: ~/.chainkeep/cases.db)
	#[arg(long, global = true)]
	registry: Option<PathBuf>,
	/// Log at debug level
	#[arg(short, long, global = true)]
	verbose: bool,
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Create a case and catalog its evidence directory
	Init {
		#[arg(long)]
		case_id: String,
		#[arg(long)]
		investigator: String,
		#[arg(long)]
		evidence_root: PathBuf,
		#[arg(long)]
		description: Option<String>,
		/// Acquisition hash algorithm (md5, sha1, sha256, sha512)
		#[arg(long)]
		algorithm: Option<String>,
	},
	/// Catalog a single file
	Add {
		#[arg(long)]
		case_id: String,
		#[arg(long)]
		person: String,
		path: PathBuf,
		#[arg(long)]
		filename: Option<String>,
		#[arg(long)]
		description: Option<String>,
	},
	/// Append a custody log entry
	Log {
		#[arg(long)]
		case_id: String,
		#[arg(long)]
		action: String,
		#[arg(long)]
		person: String,
		#[arg(long)]
		details: Option<String>,
	},
	/// Re-verify every evidence item
	Verify {
		#[arg(long)]
		case_id: String,
		#[arg(long)]
		person: String,
		/// Worker threads (default: from config)
		#[arg(long)]
		workers: Option<usize>,
		/// Give up after this many seconds
		#[arg(long)]
		timeout: Option<u64>,
		/// Print the outcome as JSON
		#[arg(long)]
		json: bool,
	},
	/// Amend the case description
	Amend {
		#[arg(long)]
		case_id: String,
		#[arg(long)]
		person: String,
		#[arg(long)]
		description: String,
	},
	/// Compute another digest for one item
	Digest {
		#[arg(long)]
		case_id: String,
		#[arg(long)]
		item: u64,
		#[arg(long, default_value = "sha256")]
		algorithm: String,
		#[arg(long)]
		person: String,
	},
	/// Check acquisition sidecars for a file, a directory or a cataloged item
	Sidecars {
		/// File to check, or a directory whose artifacts are all checked
		path: Option<PathBuf>,
		#[arg(long, requires = "item")]
		case_id: Option<String>,
		#[arg(long, requires = "case_id")]
		item: Option<u64>,
		/// Require a sidecar for this algorithm
		#[arg(long)]
		algorithm: Option<String>,
		/// Print the directory summary as JSON
		#[arg(long)]
		json: bool,
		/// Save the directory summary as JSON
		#[arg(long)]
		output: Option<PathBuf>,
	},
	/// Render the custody report
	Report {
		#[arg(long)]
		case_id: String,
		#[arg(long, value_enum, default_value = "text")]
		format: OutputFormat,
		#[arg(long)]
		output: Option<PathBuf>,
	},
	/// Export the custody log
	ExportLog {
		#[arg(long)]
		case_id: String,
		#[arg(long, value_enum, default_value = "csv")]
		format: LogFormat,
		#[arg(long)]
		output: PathBuf,
	},
	/// Manage the case registry
	Cases {
		#[command(subcommand)]
		command: CasesCommand,
	},
}

#[derive(Subcommand, Debug)]
enum CasesCommand {
	/// List registered cases
	List,
	/// Show one registered case
	Show { case_id: String },
	/// Forget a case (the snapshot is kept)
	Remove { case_id: String },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
	Text,
	Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
	Csv,
	Json,
}

fn main() -> Result<ExitCode> {
	let cli = Cli::parse();

	let default_level = if cli.verbose { "debug" } else { "info" };
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
		)
		.with_writer(std::io::stderr)
		.init();

	let config = match &cli.config {
		Some(path) => CustodyConfig::load(path)
			.with_context(|| format!("Failed to load config {}", path.display()))?,
		None => CustodyConfig::default(),
	};
	let app = App {
		store_dir: cli.store_dir.clone(),
		registry: cli.registry.clone(),
		config,
	};

	match cli.command {
		Commands::Init { case_id, investigator, evidence_root, description, algorithm } => {
			let mut config = app.config.clone();
			if let Some(algorithm) = algorithm {
				config.acquisition_algorithm = algorithm.parse()?;
			}

			let spinner = progress_spinner();
			let on_scan = |p: ScanProgress| {
				if let Some(pb) = &spinner {
					pb.set_message(format!(
						"{} files cataloged, {:.1} MB hashed",
						p.files_cataloged,
						p.bytes_hashed as f64 / (1024.0 * 1024.0)
					));
				}
			};
			let session = CaseSession::initialize_with_progress(
				&case_id,
				&investigator,
				&evidence_root,
				description,
				config,
				&app.store_dir,
				Some(&on_scan),
			)?;
			if let Some(pb) = spinner {
				pb.finish_and_clear();
			}

			app.register(&session);
			let counts = session.record().status_counts();
			println!("✅ Case {} initialized", session.case().case_id);
			println!("📁 Evidence Root: {}", session.case().evidence_root.display());
			println!("📈 Items Cataloged: {}", counts.total);
			if let Some(entry) = session.record().ledger.last() {
				if let Some(details) = &entry.details {
					println!("📝 {}", details);
				}
			}
			println!("💾 Snapshot: {}", session.snapshot_path().display());
		}
		Commands::Add { case_id, person, path, filename, description } => {
			let mut session = app.open(&case_id)?;
			let item = session.add_evidence(&path, filename, description, &person)?;
			app.register(&session);
			println!("✅ Added item #{}: {}", item.id, item.filename);
			println!("🔐 {}", item.hash);
		}
		Commands::Log { case_id, action, person, details } => {
			let mut session = app.open(&case_id)?;
			let entry = session.add_custody_entry(&action, &person, details)?;
			app.register(&session);
			println!("📝 Custody entry #{} recorded: {}", entry.id, entry.action);
		}
		Commands::Verify { case_id, person, workers, timeout, json } => {
			let mut session = app.open(&case_id)?;
			let mut options = VerifyOptions::from_config(session.config());
			if let Some(workers) = workers {
				options.workers = workers;
			}
			if let Some(secs) = timeout {
				options.timeout = Some(Duration::from_secs(secs));
			}

			let bar = progress_bar(session.record().catalog.len() as u64);
			let on_verify = |p: VerifyProgress| {
				if let Some(pb) = &bar {
					pb.set_position(p.completed as u64);
				}
			};
			let outcome = session.verify_with_progress(&person, &options, Some(&on_verify))?;
			if let Some(pb) = bar {
				pb.finish_and_clear();
			}
			app.register(&session);

			if json {
				println!("{}", serde_json::to_string_pretty(&outcome)?);
			} else if outcome.cancelled {
				println!("⏱️  Verification interrupted: {}", outcome.summary());
			} else if outcome.all_passed {
				println!("✅ All {} evidence items verified", outcome.checked);
			} else {
				println!("❌ Integrity issues found:");
				for issue in &outcome.issues {
					println!("  - {}", issue);
				}
			}

			if !outcome.all_passed {
				return Ok(ExitCode::from(1));
			}
		}
		Commands::Amend { case_id, person, description } => {
			let mut session = app.open(&case_id)?;
			session.amend_description(&description, &person)?;
			app.register(&session);
			println!("📝 Description updated for case {}", case_id);
		}
		Commands::Digest { case_id, item, algorithm, person } => {
			let algorithm: HashAlgorithm = algorithm.parse()?;
			let mut session = app.open(&case_id)?;
			let hash = session.compute_digest(item, algorithm, &person)?;
			app.register(&session);
			println!("🔐 Item #{} {}: {}", item, hash.algorithm.name(), hash.digest);
		}
		Commands::Sidecars { path, case_id, item, algorithm, json, output } => {
			let algorithm = algorithm.map(|a| a.parse::<HashAlgorithm>()).transpose()?;
			if let (Some(dir), None) = (&path, &case_id) {
				if dir.is_dir() {
					let check = check_sidecars_in_dir(dir, algorithm)?;
					let rendered = serde_json::to_string_pretty(&check)?;
					if let Some(path) = &output {
						std::fs::write(path, &rendered)
							.with_context(|| format!("Failed to write summary {}", path.display()))?;
					}
					if json {
						println!("{}", rendered);
					} else {
						print_directory_check(&check);
						if let Some(path) = &output {
							println!("📊 Verification summary saved to: {}", path.display());
						}
					}
					if !check.all_passed() {
						return Ok(ExitCode::from(1));
					}
					return Ok(ExitCode::SUCCESS);
				}
			}
			let report = match (path, case_id, item) {
				(_, Some(case_id), Some(item)) => {
					app.open(&case_id)?.check_item_sidecars(item, algorithm)?
				}
				(Some(path), _, _) => check_sidecars(&path, algorithm)?,
				_ => anyhow::bail!("Give a file path or --case-id with --item"),
			};
			print_sidecar_report(&report);
			if !report.passed() {
				return Ok(ExitCode::from(1));
			}
		}
		Commands::Report { case_id, format, output } => {
			let session = app.open(&case_id)?;
			let report = session.report();
			let rendered = match format {
				OutputFormat::Text => report.render_text(),
				OutputFormat::Json => report.to_json()?,
			};
			match output {
				Some(path) => {
					std::fs::write(&path, rendered)
						.with_context(|| format!("Failed to write report {}", path.display()))?;
					println!("📊 Custody report saved to: {}", path.display());
				}
				None => println!("{}", rendered),
			}
		}
		Commands::ExportLog { case_id, format, output } => {
			let session = app.open(&case_id)?;
			let ledger = &session.record().ledger;
			match format {
				LogFormat::Csv => ledger.export_csv(&output)?,
				LogFormat::Json => ledger.export_json(&output)?,
			}
			println!("📤 Exported {} custody entries to {}", ledger.len(), output.display());
		}
		Commands::Cases { command } => {
			let registry = app.open_registry()?;
			match command {
				CasesCommand::List => {
					let cases = registry.list()?;
					if cases.is_empty() {
						println!("No cases registered in {}", registry.path().display());
					}
					for case in cases {
						println!(
							"{}  {}  {}  items: {} ({} verified, {} missing, {} modified)  entries: {}",
							case.case_id,
							case.investigator,
							case.created_at.format("%Y-%m-%d"),
							case.counts.total,
							case.counts.verified,
							case.counts.missing,
							case.counts.modified,
							case.custody_entries
						);
					}
				}
				CasesCommand::Show { case_id } => match registry.lookup(&case_id)? {
					Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
					None => anyhow::bail!("Case not registered: {}", case_id),
				},
				CasesCommand::Remove { case_id } => {
					registry.remove(&case_id)?;
					println!("🗑️  Removed {} from the registry", case_id);
				}
			}
		}
	}
	Ok(ExitCode::SUCCESS)
}

/// Shared command state
struct App {
	store_dir: PathBuf,
	registry: Option<PathBuf>,
	config: CustodyConfig,
}

impl App {
	fn open_registry(&self) -> Result<CaseRegistry> {
		let path = match &self.registry {
			Some(path) => path.clone(),
			None => CaseRegistry::default_path()?,
		};
		CaseRegistry::open(path)
	}

	/// Open from the store directory, falling back to the registry's snapshot path
	fn open(&self, case_id: &str) -> Result<CaseSession> {
		match CaseSession::open(&self.store_dir, case_id, self.config.clone()) {
			Ok(session) => Ok(session),
			Err(CustodyError::NotFound { path }) => {
				let registered = self
					.open_registry()
					.ok()
					.and_then(|registry| registry.lookup(case_id).ok().flatten());
				match registered {
					Some(summary) => {
						tracing::debug!("Using registered snapshot {}", summary.snapshot_path.display());
						Ok(CaseSession::open_snapshot(&summary.snapshot_path, self.config.clone())?)
					}
					None => Err(CustodyError::NotFound { path }.into()),
				}
			}
			Err(e) => Err(e.into()),
		}
	}

	/// The snapshot is authoritative; a registry failure only warns
	fn register(&self, session: &CaseSession) {
		let snapshot = absolute(session.snapshot_path());
		let result = self
			.open_registry()
			.and_then(|registry| registry.register(session.record(), &snapshot));
		if let Err(e) = result {
			tracing::warn!("Could not update case registry: {:#}", e);
		}
	}
}

fn absolute(path: &Path) -> PathBuf {
	if path.is_absolute() {
		return path.to_path_buf();
	}
	std::env::current_dir()
		.map(|cwd| cwd.join(path))
		.unwrap_or_else(|_| path.to_path_buf())
}

fn progress_spinner() -> Option<ProgressBar> {
	if !atty::is(atty::Stream::Stderr) {
		return None;
	}
	let pb = ProgressBar::new_spinner();
	if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
		pb.set_style(style);
	}
	pb.enable_steady_tick(Duration::from_millis(120));
	Some(pb)
}

fn progress_bar(total: u64) -> Option<ProgressBar> {
	if !atty::is(atty::Stream::Stderr) || total == 0 {
		return None;
	}
	let pb = ProgressBar::new(total);
	if let Ok(style) =
		ProgressStyle::default_bar().template("{bar:40.cyan/blue} {pos}/{len} items verified")
	{
		pb.set_style(style);
	}
	Some(pb)
}

fn print_check(label: &str, status: &CheckStatus) {
	match status {
		CheckStatus::Passed => println!("  ✅ {}: passed", label),
		CheckStatus::Failed(reason) => println!("  ❌ {}: {}", label, reason),
		CheckStatus::Skipped(reason) => println!("  ⏭️  {}: {}", label, reason),
	}
}

fn print_directory_check(check: &DirectoryCheck) {
	if check.total_files == 0 {
		println!("⚠️  No acquisition files found in {}", check.root.display());
		return;
	}
	println!("📁 Found {} acquisition files to verify", check.total_files);
	for report in &check.results {
		println!("\n{}", "=".repeat(60));
		print_sidecar_report(report);
	}

	println!("\n📊 Verification Summary:");
	println!("   Total files: {}", check.total_files);
	println!("   Passed: {}", check.passed);
	println!("   Failed: {}", check.failed);
	if check.failed > 0 {
		println!("\n❌ Failed verifications:");
		for report in check.failures() {
			println!("   - {}", report.file.display());
		}
		for error in &check.errors {
			println!("   - {}", error.file.display());
			println!("     Error: {}", error.error);
		}
	}
}

fn print_sidecar_report(report: &SidecarReport) {
	println!("🔍 {} ({} bytes)", report.file.display(), report.file_size);
	let hash_label = match report.hash_algorithm {
		Some(algorithm) => format!("{} hash", algorithm.name()),
		None => "hash".to_string(),
	};
	print_check(&hash_label, &report.hash);
	print_check("metadata", &report.metadata);
	print_check("catalog size", &report.catalog);
	match &report.acquisition_log {
		Some(log) => println!("  📄 acquisition log: {}", log.display()),
		None => println!("  📄 acquisition log: none"),
	}
	if report.passed() {
		println!("✅ Sidecar checks passed");
	} else {
		println!("❌ Sidecar checks failed");
	}
}
