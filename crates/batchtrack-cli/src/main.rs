//! Operator command line for the batch tracking workflow
//!
//! Runs one workflow operation per invocation against the file-backed
//! store. Broadcasting is a no-op here; subscribers attach in the
//! hosting service, not in one-shot tooling.

use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::sync::Arc;

use batchtrack_core::{
    AuditSink, BatchAttributes, CreateBatchRequest, FileStore, ForeignUrgentChild,
    NullBroadcaster, TrackConfig, UpdatePatch, WorkflowEngine,
};
use batchtrack_types::{AcceptStatus, Destination, EntityId, EntityType, ItemKey, UserId};

type Engine = WorkflowEngine<FileStore, NullBroadcaster, FileStore>;

fn item_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("id")
                .long("id")
                .value_name("UUID")
                .help("Work item id")
                .required(true),
        )
        .arg(
            Arg::new("type")
                .long("type")
                .value_name("KIND")
                .help("Entity type: batch or foreign_urgent")
                .default_value("batch"),
        )
}

fn user_arg(command: Command) -> Command {
    command.arg(
        Arg::new("user")
            .long("user")
            .value_name("ID")
            .help("Acting user id"),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with INFO as default if RUST_LOG not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("batchtrack")
        .version("1.0.0")
        .about("Batch workflow tracking processor")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Data directory for the file store (overrides config)"),
        )
        .subcommand(user_arg(
            Command::new("create")
                .about("Create a batch with attached foreign/urgent cases")
                .arg(
                    Arg::new("batch-size")
                        .long("batch-size")
                        .value_name("N")
                        .required(true),
                )
                .arg(
                    Arg::new("foreign-urgent")
                        .long("foreign-urgent")
                        .value_name("N")
                        .default_value("0"),
                )
                .arg(
                    Arg::new("children")
                        .long("children")
                        .value_name("N")
                        .help("Number of foreign/urgent cases to attach")
                        .default_value("0"),
                )
                .arg(Arg::new("batch-number").long("batch-number").value_name("REF"))
                .arg(Arg::new("scheme").long("scheme").value_name("NAME"))
                .arg(Arg::new("notes").long("notes").value_name("TEXT")),
        ))
        .subcommand(user_arg(item_args(
            Command::new("send")
                .about("Send a work item to a department or to filing")
                .arg(
                    Arg::new("to")
                        .long("to")
                        .value_name("DEST")
                        .help("reception, admittance, billing or filing")
                        .required(true),
                ),
        )))
        .subcommand(user_arg(item_args(
            Command::new("accept")
                .about("Accept a work item in its current department")
                .arg(
                    Arg::new("filing")
                        .long("filing")
                        .help("Settle the item as filing instead of current")
                        .action(ArgAction::SetTrue),
                ),
        )))
        .subcommand(user_arg(item_args(
            Command::new("cancel").about("Cancel an in-flight transfer"),
        )))
        .subcommand(user_arg(item_args(
            Command::new("archive").about("Archive a work item"),
        )))
        .subcommand(user_arg(item_args(
            Command::new("update")
                .about("Patch the editable fields of a settled work item")
                .arg(Arg::new("batch-number").long("batch-number").value_name("REF"))
                .arg(Arg::new("scheme").long("scheme").value_name("NAME"))
                .arg(Arg::new("account").long("account").value_name("NO"))
                .arg(Arg::new("service-date").long("service-date").value_name("DATE"))
                .arg(Arg::new("notes").long("notes").value_name("TEXT"))
                .arg(Arg::new("batch-size").long("batch-size").value_name("N"))
                .arg(Arg::new("foreign-urgent").long("foreign-urgent").value_name("N")),
        )))
        .subcommand(item_args(
            Command::new("show").about("Show a work item with its workflow rows"),
        ))
        .subcommand(item_args(
            Command::new("history").about("Show the transfer ledger of a work item"),
        ))
        .subcommand(
            Command::new("log").about("Tail the audit log").arg(
                Arg::new("limit")
                    .long("limit")
                    .value_name("N")
                    .default_value("20"),
            ),
        )
        .get_matches();

    let data_root = resolve_data_root(&matches)?;
    log::info!("Using data directory: {}", data_root);

    let store = Arc::new(FileStore::new(&data_root)?);
    let engine: Engine = WorkflowEngine::new(store.clone(), Arc::new(NullBroadcaster), store.clone());

    match matches.subcommand() {
        Some(("create", sub)) => {
            let request = CreateBatchRequest {
                batch_size: parse_u32(sub, "batch-size")?,
                total_foreign_urgent: parse_u32(sub, "foreign-urgent")?,
                attributes: BatchAttributes {
                    batch_number: sub.get_one::<String>("batch-number").cloned(),
                    scheme_name: sub.get_one::<String>("scheme").cloned(),
                    notes: sub.get_one::<String>("notes").cloned(),
                    ..BatchAttributes::default()
                },
                children: (0..parse_u32(sub, "children")?)
                    .map(|_| ForeignUrgentChild::default())
                    .collect(),
            };
            let created = engine.create_batch(request, user_of(sub)?).await?;
            print_json(&created)?;
        }
        Some(("send", sub)) => {
            let to: Destination = sub
                .get_one::<String>("to")
                .expect("required arg")
                .parse()
                .map_err(|e| anyhow!("{}", e))?;
            let outcome = engine
                .move_work_item(&item_key(sub)?, to, user_of(sub)?)
                .await?;
            print_json(&outcome)?;
        }
        Some(("accept", sub)) => {
            let hint = sub
                .get_flag("filing")
                .then_some(AcceptStatus::Filing);
            let view = engine
                .accept_work_item(&item_key(sub)?, user_of(sub)?, hint)
                .await?;
            print_json(&view)?;
        }
        Some(("cancel", sub)) => {
            let view = engine.cancel_transfer(&item_key(sub)?, user_of(sub)?).await?;
            print_json(&view)?;
        }
        Some(("archive", sub)) => {
            let view = engine
                .archive_work_item(&item_key(sub)?, user_of(sub)?)
                .await?;
            print_json(&view)?;
        }
        Some(("update", sub)) => {
            let patch = UpdatePatch {
                batch_number: sub.get_one::<String>("batch-number").cloned(),
                scheme_name: sub.get_one::<String>("scheme").cloned(),
                account_number: sub.get_one::<String>("account").cloned(),
                service_date: sub.get_one::<String>("service-date").cloned(),
                notes: sub.get_one::<String>("notes").cloned(),
                batch_size: parse_opt_u32(sub, "batch-size")?,
                total_foreign_urgent: parse_opt_u32(sub, "foreign-urgent")?,
            };
            let outcome = engine
                .update_work_item_fields(&item_key(sub)?, patch, user_of(sub)?)
                .await?;
            print_json(&outcome)?;
        }
        Some(("show", sub)) => {
            let detail = engine.work_item(&item_key(sub)?).await?;
            print_json(&detail)?;
        }
        Some(("history", sub)) => {
            let ledger = engine.transfer_history(&item_key(sub)?).await?;
            print_json(&ledger)?;
        }
        Some(("log", sub)) => {
            let limit = parse_u32(sub, "limit")? as usize;
            let events = store.read_events().await?;
            let start = events.len().saturating_sub(limit);
            print_json(&events[start..])?;
        }
        _ => {
            return Err(anyhow!("No subcommand given; run with --help for usage"));
        }
    }

    Ok(())
}

fn resolve_data_root(matches: &ArgMatches) -> Result<String> {
    if let Some(dir) = matches.get_one::<String>("data-dir") {
        return Ok(dir.clone());
    }
    if let Some(config_path) = matches.get_one::<String>("config") {
        let config = TrackConfig::from_file(config_path)
            .with_context(|| format!("loading config {}", config_path))?;
        return Ok(config.storage.data_root);
    }
    Ok("./data".to_string())
}

fn item_key(matches: &ArgMatches) -> Result<ItemKey> {
    let entity_type: EntityType = matches
        .get_one::<String>("type")
        .expect("defaulted arg")
        .parse()
        .map_err(|e| anyhow!("{}", e))?;
    let entity_id = EntityId::from_string(matches.get_one::<String>("id").expect("required arg"))
        .map_err(|e| anyhow!("{}", e))?;
    Ok(ItemKey::new(entity_type, entity_id))
}

fn user_of(matches: &ArgMatches) -> Result<Option<UserId>> {
    matches
        .get_one::<String>("user")
        .map(|raw| {
            raw.parse::<i64>()
                .map(UserId::new)
                .with_context(|| format!("invalid user id '{}'", raw))
        })
        .transpose()
}

fn parse_u32(matches: &ArgMatches, name: &str) -> Result<u32> {
    let raw = matches.get_one::<String>(name).expect("defaulted arg");
    raw.parse()
        .with_context(|| format!("invalid {} '{}'", name, raw))
}

fn parse_opt_u32(matches: &ArgMatches, name: &str) -> Result<Option<u32>> {
    matches
        .get_one::<String>(name)
        .map(|raw| {
            raw.parse()
                .with_context(|| format!("invalid {} '{}'", name, raw))
        })
        .transpose()
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
