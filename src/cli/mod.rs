//! Types and functions for the command-line interface.
//!
//! The contents of this module are intended for use by the `fastboot-flash`
//! binary and are not guaranteed to be stable; feel free to opt out by
//! disabling the default `cli` feature if you only need the library.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use clap_complete::Shell;
use comfy_table::{modifiers, presets::UTF8_FULL, Attribute, Cell, Color, Table};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use miette::{IntoDiagnostic, Result, WrapErr};

pub mod config;

use self::config::Config;
use crate::archive::zip::ZipContainer;
use crate::connection::usb::UsbFastbootSession;
use crate::connection::FastbootSession;
use crate::executor::FlashExecutor;
use crate::plan::FlashPlan;
use crate::requirements::ManifestRequirements;
use crate::script::Command;

/// Establish a connection with a fastboot-mode device.
#[derive(Debug, Args)]
#[non_exhaustive]
pub struct ConnectArgs {
    /// Restrict device enumeration to this USB vendor id (hex, e.g. `18d1`).
    #[arg(long, value_parser = parse_hex_u16)]
    pub vid: Option<u16>,
    /// Restrict device enumeration to this USB product id (hex).
    #[arg(long, value_parser = parse_hex_u16)]
    pub pid: Option<u16>,
}

/// Flash an optimized factory archive to a connected device.
#[derive(Debug, Args)]
#[non_exhaustive]
pub struct FlashArgs {
    /// Path to the optimized factory archive (.zip).
    pub archive: PathBuf,
    /// Connection configuration.
    #[clap(flatten)]
    pub connect_args: ConnectArgs,
    /// Erase every partition an `erase` script line names, not only
    /// `avb_custom_key`.
    #[arg(long)]
    pub wipe: bool,
    /// Parse and print the plan without touching any device.
    #[arg(long)]
    pub dry_run: bool,
    /// Skip the destructive-wipe confirmation prompt.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Parse an archive's plan and print it, without touching any device.
#[derive(Debug, Args)]
#[non_exhaustive]
pub struct InspectArgs {
    /// Path to the optimized factory archive (.zip).
    pub archive: PathBuf,
}

/// Generate shell completions for the given shell.
#[derive(Debug, Args)]
#[non_exhaustive]
pub struct CompletionsArgs {
    pub shell: Shell,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Flash(FlashArgs),
    Inspect(InspectArgs),
    Completions(CompletionsArgs),
}

fn parse_hex_u16(input: &str) -> Result<u16, std::num::ParseIntError> {
    u16::from_str_radix(input.trim_start_matches("0x"), 16)
}

/// Partitions the destructive-wipe confirmation prompt does not need to
/// cover, because erasing them is an expected part of a normal flash.
const DATA_PARTITIONS: &[&str] = &["userdata", "metadata"];

/// Open `archive_path`, parse its plan, and run it against the first
/// enumerated fastboot device.
pub fn flash(args: FlashArgs, config: &Config) -> Result<()> {
    let blob = fs::read(&args.archive)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read archive {}", args.archive.display()))?;
    let archive = ZipContainer::open(blob).into_diagnostic()?;
    let plan = FlashPlan::build(&archive).into_diagnostic()?;

    if args.dry_run {
        print_plan(&plan);
        return Ok(());
    }

    let wipe = args.wipe || config.default_wipe;
    if wipe && !args.yes {
        let destructive = plan.commands().iter().any(|command| {
            matches!(command, Command::Erase { partition } if !DATA_PARTITIONS.contains(&partition.as_str()))
        });

        if destructive {
            let confirmed = Confirm::new()
                .with_prompt("This flash erases one or more non-data partitions. Continue?")
                .default(false)
                .interact()
                .into_diagnostic()?;

            if !confirmed {
                warn!("flash aborted by user");
                return Ok(());
            }
        }
    }

    let vid = args.connect_args.vid.or(config.vendor_id);
    let pid = args.connect_args.pid.or(config.product_id);
    let timeout = config
        .default_timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(UsbFastbootSession::DEFAULT_TIMEOUT);

    info!("waiting for fastboot device...");
    let session: Box<dyn FastbootSession> = Box::new(
        UsbFastbootSession::open_first_with_timeout(vid, pid, timeout)
            .into_diagnostic()
            .wrap_err("failed to open a fastboot-mode USB device")?,
    );

    ctrlc::set_handler(move || {
        warn!("received interrupt; the device may be left in a partially flashed state");
        std::process::exit(1);
    })
    .into_diagnostic()?;

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40}] {msg}")
            .unwrap()
            .progress_chars("=> "),
    );

    let requirements = ManifestRequirements;
    let executor = FlashExecutor::new(&archive, &requirements, wipe);

    let mut reconnect = || -> crate::error::Result<Box<dyn FastbootSession>> {
        info!("reconnecting after reboot...");
        Ok(Box::new(UsbFastbootSession::open_first_with_timeout(
            vid, pid, timeout,
        )?))
    };

    let mut progress = |action: &str, item: &str, overall: f32| {
        bar.set_position((overall * 100.0) as u64);
        bar.set_message(format!("{action} {item}"));
    };

    let result = executor.run(&plan, session, &mut reconnect, &mut progress);
    bar.finish_and_clear();

    result.into_diagnostic().wrap_err("flash failed")?;
    info!("flashing has completed!");

    Ok(())
}

/// Parse and print an archive's plan without touching any device.
pub fn inspect(args: InspectArgs) -> Result<()> {
    let blob = fs::read(&args.archive)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read archive {}", args.archive.display()))?;
    let archive = ZipContainer::open(blob).into_diagnostic()?;
    let plan = FlashPlan::build(&archive).into_diagnostic()?;

    print_plan(&plan);

    Ok(())
}

fn print_plan(plan: &FlashPlan) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Command")
                .fg(Color::Green)
                .add_attribute(Attribute::Bold),
            Cell::new("Detail")
                .fg(Color::Cyan)
                .add_attribute(Attribute::Bold),
        ]);

    for command in plan.commands() {
        let (name, detail) = describe(command);
        table.add_row(vec![Cell::new(name), Cell::new(detail)]);
    }

    println!("{table}");
    println!(
        "Total flash bytes: {} ({} commands)",
        plan.total_flash_bytes(),
        plan.commands().len()
    );
}

fn describe(command: &Command) -> (&'static str, String) {
    match command {
        Command::CheckRequirements { file_ref } => ("check-requirements", file_ref.clone()),
        Command::CheckVar { name, expected } => ("check-var", format!("{name} == {expected}")),
        Command::Erase { partition } => ("erase", partition.clone()),
        Command::Flash {
            partition,
            file_ref,
            slot,
        } => ("flash", format!("{partition} <- {file_ref} ({slot})")),
        Command::MaybeCancelSnapshotUpdate => ("maybe-cancel-snapshot-update", String::new()),
        Command::RebootBootloader => ("reboot-bootloader", String::new()),
        Command::RunCmd { raw } => ("run-cmd", raw.clone()),
        Command::ToggleActiveSlot => ("toggle-active-slot", String::new()),
    }
}

/// Generate shell completions for the given shell.
pub fn completions(args: &CompletionsArgs, app: &mut clap::Command, bin_name: &str) -> Result<()> {
    clap_complete::generate(args.shell, app, bin_name, &mut std::io::stdout());
    Ok(())
}
