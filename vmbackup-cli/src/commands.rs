//! Subcommand handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;
use vmbackup_engine::{
    BackupOptions, BackupWorkflow, CommandArchive, ExportOrchestrator, RestorePipeline,
    SnapshotManager,
};
use vmbackup_platform::{
    MockPlatform, OvirtClient, Platform, StorageDomainType, VmPowerState,
};

use crate::cli::{Command, SnapshotCommand};
use crate::config::{Config, PlatformBackend};

/// VM seeded into the development platform.
pub const DEV_VM: &str = "demo";

const DEV_OVF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ovf:Envelope xmlns:ovf="http://schemas.dmtf.org/ovf/envelope/1/"><References><File ovf:href="5c3b9a1e-0d7f-4e52-9a61-2f4c8b0d1e37/8f6a2c4d-1b3e-4f5a-9c7d-0e2b4a6c8d1f" ovf:id="8f6a2c4d-1b3e-4f5a-9c7d-0e2b4a6c8d1f"/></References><Section xsi:type="ovf:DiskSection_Type"><Info>List of Virtual Disks</Info><Disk ovf:diskId="8f6a2c4d-1b3e-4f5a-9c7d-0e2b4a6c8d1f" ovf:fileRef="5c3b9a1e-0d7f-4e52-9a61-2f4c8b0d1e37/8f6a2c4d-1b3e-4f5a-9c7d-0e2b4a6c8d1f" ovf:format="http://www.vmware.com/specifications/vmdk.html#sparse"/></Section></ovf:Envelope>"#;

/// Build the configured platform backend.
pub fn build_platform(config: &Config) -> Result<Arc<dyn Platform>> {
    match config.platform.backend {
        PlatformBackend::Mock => {
            info!("Using mock platform (development mode)");
            let platform = MockPlatform::new();
            platform.add_vm(DEV_VM, VmPowerState::Up);
            platform.set_vm_ovf(DEV_VM, DEV_OVF);
            platform.add_storage_domain("export", StorageDomainType::Export);
            Ok(Arc::new(platform))
        }
        PlatformBackend::Ovirt => {
            let client = OvirtClient::new(&config.platform.ovirt())
                .context("Failed to create oVirt client")?;
            info!(url = %client.base_url(), "Using oVirt platform");
            Ok(Arc::new(client))
        }
    }
}

/// Run a subcommand.
pub async fn run(command: Command, config: &Config, cancel: CancellationToken) -> Result<()> {
    if let Command::Restore { dir, path, export_path } = command {
        let archive = CommandArchive::new(
            config.restore.archive.program.clone(),
            config.restore.archive.args.clone(),
        );
        let report = RestorePipeline::new(Arc::new(archive))
            .with_backup_root(path.unwrap_or_else(|| config.restore.path.clone()))
            .with_export_root(export_path.unwrap_or_else(|| config.restore.export_path.clone()))
            .run(&dir)
            .await?;
        println!(
            "Restored {} disk group(s) into {}",
            report.disk_groups.len(),
            report.export_domain_dir.display()
        );
        return Ok(());
    }

    let platform = build_platform(config)?;
    let version = platform.api_version().await?;
    info!(version = %version, "Connected to platform");

    let policy = config.polling.policy();
    let export = || {
        ExportOrchestrator::new(platform.clone(), policy.clone(), cancel.clone())
            .with_template(config.backup.template.clone())
    };

    match command {
        Command::Backup { vm, name, description, output_dir } => {
            let report = BackupWorkflow::new(platform.clone(), policy.clone(), cancel.clone())
                .with_export_settings(
                    Some(&config.backup.template),
                    Some(output_dir.unwrap_or_else(|| config.backup.output_dir.clone())),
                )
                .run(&vm, &BackupOptions { clone_name: name, description })
                .await?;
            println!(
                "Exported {} to {} (OVF: {})",
                report.clone.name,
                report.export_domain.name,
                report.ovf.ovf_path.display()
            );
        }
        Command::Snapshot { action } => {
            let snapshots = SnapshotManager::new(platform.clone(), policy.clone(), cancel.clone());
            match action {
                SnapshotCommand::Create { vm, description } => {
                    let snapshot = snapshots.create_snapshot(&vm, &description).await?;
                    println!("Snapshot {} ({}) is {}", snapshot.description, snapshot.id, snapshot.status);
                }
                SnapshotCommand::Delete { vm, description } => {
                    snapshots.delete_snapshot(&vm, &description).await?;
                    println!("Snapshot {} deleted", description);
                }
            }
        }
        Command::Ovf { vm, description, output_dir } => {
            let artifacts = export()
                .with_output_dir(output_dir.unwrap_or_else(|| config.backup.output_dir.clone()))
                .fetch_ovf(&vm, &description)
                .await?;
            println!("{}", artifacts.ovf_path.display());
            println!("{}", artifacts.xml_path.display());
        }
        Command::Status { vm } => {
            let export = export();
            if export.vm_exists(&vm).await? {
                println!("{}: {}", vm, export.vm_power_state(&vm).await?);
            } else {
                println!("{}: not found", vm);
            }
        }
        Command::ExportDomain { vm } => match export().locate_export_domain(&vm).await? {
            Some(domain) => println!("{} ({})", domain.name, domain.id),
            None => println!("none"),
        },
        Command::Restore { .. } => {}
    }

    Ok(())
}
