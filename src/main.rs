//! # hrflow
//!
//! Command-line front end for the client and candidate status workflow.
//!
//! ## Usage
//!
//! ```bash
//! # First Owner of an empty directory, then sign-ups approved by staff
//! hrflow user bootstrap --id owner-1 --name "Olivia" --email olivia@agency.test
//! hrflow user register --id manager-1 --name "Max" --email max@agency.test
//! hrflow --actor-id owner-1 user approve manager-1
//! hrflow --actor-id owner-1 user set-role manager-1 MANAGER
//!
//! # Act as a staff member
//! hrflow --actor-id owner-1 client create --name "Acme Corp"
//! hrflow --actor-id owner-1 client apply <client-id> ACTIVE --comment "contract signed"
//! hrflow --actor-id manager-1 client request <client-id> INACTIVE --comment "renewal lapsed"
//! hrflow approvals
//! ```
//!
//! Settings live in `config.yaml` under the per-user config directory
//! (override with `HRFLOW_CONFIG_DIR`). `RUST_LOG` overrides the log level.

use clap::Parser;
use hrflow::{
    adapter::{engine::StatusEngine, storage::StoreFactory},
    domain::{
        command::{CandidateCommands, ClientCommands, HrflowCli, HrflowCliCommand, StorageCommands, UserCommands},
        error::WorkflowError,
        role::Actor,
        view::{HistoryRow, NoteRow, PendingApprovalRow, RequestRow, TimelineRow, UserRow}
    },
    service::config::{AppConfig, Settings}
};
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};
use tracing::Subscriber;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let cli = HrflowCli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error [{}]: {}", e.kind(), e);
        std::process::exit(1);
    }
}

async fn run(cli: HrflowCli) -> Result<(), WorkflowError> {
    let mut config = load_config(subscriber(&Settings::default().log_level), AppConfig::init)?;
    subscriber(&config.settings.log_level).init();

    if let HrflowCliCommand::Storage { command } = &cli.command {
        return match command {
            StorageCommands::Set { backend } => {
                config.set_storage(*backend)?;
                println!("Storage backend set to {}", backend.as_str());
                Ok(())
            }
            StorageCommands::Current => {
                println!("{}", config.storage().as_str());
                Ok(())
            }
        };
    }

    config.ensure_dirs_exist()?;
    let store = StoreFactory::create(config.storage(), Some(config.database_path().as_path()))?;
    let engine = StatusEngine::new(store);
    let out = Output { json: cli.json };
    let actor_id = cli.actor_id;

    match cli.command {
        HrflowCliCommand::User { command } => match command {
            UserCommands::Bootstrap { id, name, email } => out.record(&engine.bootstrap_owner(id, &name, &email).await?),
            UserCommands::Register { id, name, email } => out.record(&engine.register_user(id, &name, &email).await?),
            UserCommands::List => out.table(&engine.list_users().await?, |item| UserRow::from(item)),
            UserCommands::Pending => out.table(&engine.list_pending_users().await?, |item| UserRow::from(item)),
            UserCommands::Approve { user_id } => {
                let actor = acting(&engine, &actor_id).await?;
                out.record(&engine.approve_user(&user_id, &actor).await?)
            }
            UserCommands::Suspend { user_id } => {
                let actor = acting(&engine, &actor_id).await?;
                out.record(&engine.suspend_user(&user_id, &actor).await?)
            }
            UserCommands::SetRole { user_id, role } => {
                let actor = acting(&engine, &actor_id).await?;
                out.record(&engine.change_user_role(&user_id, role, &actor).await?)
            }
        },
        HrflowCliCommand::Client { command } => client(&engine, &out, &actor_id, command).await,
        HrflowCliCommand::Candidate { command } => candidate(&engine, &out, &actor_id, command).await,
        HrflowCliCommand::Approvals => {
            out.table(&engine.list_pending_approvals().await?, |item| PendingApprovalRow::from(item))
        }
        HrflowCliCommand::Storage { .. } => Ok(())
    }
}

async fn client(
    engine: &StatusEngine,
    out: &Output,
    actor_id: &Option<String>,
    command: ClientCommands
) -> Result<(), WorkflowError> {
    match command {
        ClientCommands::Show { client_id } => out.record(&engine.get_client(&client_id).await?),
        ClientCommands::History { client_id } => {
            out.table(&engine.get_client_status_history(&client_id).await?, |item| HistoryRow::from(item))
        }
        ClientCommands::Timeline { client_id } => {
            out.table(&engine.get_entity_timeline(&client_id).await?, |item| TimelineRow::from(item))
        }
        ClientCommands::Requests { client_id } => {
            out.table(&engine.list_client_requests(&client_id).await?, |item| RequestRow::from(item))
        }
        command => {
            let actor = acting(engine, actor_id).await?;
            match command {
                ClientCommands::Create { name, industry } => {
                    out.record(&engine.create_client(&name, industry, &actor).await?)
                }
                ClientCommands::Apply { client_id, status, comment } => {
                    out.record(&engine.apply_client_status_direct(&client_id, status, comment, &actor).await?)
                }
                ClientCommands::Request { client_id, status, comment } => {
                    out.record(&engine.create_client_status_request(&client_id, status, comment, &actor).await?)
                }
                ClientCommands::Approve { client_id, request_id } => {
                    out.record(&engine.approve_client_status_request(&client_id, &request_id, &actor).await?)
                }
                ClientCommands::Reject { client_id, request_id, review_comment } => out.record(
                    &engine.reject_client_status_request(&client_id, &request_id, review_comment, &actor).await?
                ),
                ClientCommands::Archive { client_id } => out.record(&engine.archive_client(&client_id, &actor).await?),
                ClientCommands::Assign { client_id, assignee_id } => {
                    out.record(&engine.assign_client(&client_id, &assignee_id, &actor).await?)
                }
                ClientCommands::Comment { client_id, content } => {
                    out.record(&engine.add_client_comment(&client_id, &content, &actor).await?)
                }
                ClientCommands::StatusComment { client_id, history_id, content } => {
                    out.record(&engine.add_status_comment(&client_id, &history_id, &content, &actor).await?)
                }
                ClientCommands::Show { .. }
                | ClientCommands::History { .. }
                | ClientCommands::Timeline { .. }
                | ClientCommands::Requests { .. } => Ok(())
            }
        }
    }
}

async fn candidate(
    engine: &StatusEngine,
    out: &Output,
    actor_id: &Option<String>,
    command: CandidateCommands
) -> Result<(), WorkflowError> {
    match command {
        CandidateCommands::Show { candidate_id } => out.record(&engine.get_candidate(&candidate_id).await?),
        CandidateCommands::Notes { candidate_id } => {
            out.table(&engine.list_candidate_notes(&candidate_id).await?, |item| NoteRow::from(item))
        }
        CandidateCommands::History { candidate_id } => {
            out.table(&engine.get_candidate_status_history(&candidate_id).await?, |item| HistoryRow::from(item))
        }
        command => {
            let actor = acting(engine, actor_id).await?;
            match command {
                CandidateCommands::Create { name, email, assign_to } => {
                    out.record(&engine.create_candidate(&name, &email, assign_to, &actor).await?)
                }
                CandidateCommands::Status { candidate_id, status, comment } => {
                    out.record(&engine.update_candidate_status(&candidate_id, status, comment, &actor).await?)
                }
                CandidateCommands::Assign { candidate_id, assignee_id } => {
                    out.record(&engine.assign_candidate(&candidate_id, &assignee_id, &actor).await?)
                }
                CandidateCommands::Note { candidate_id, content } => {
                    out.record(&engine.add_candidate_note(&candidate_id, &content, &actor).await?)
                }
                CandidateCommands::Delete { candidate_id } => {
                    let deleted = engine.delete_candidate(&candidate_id, &actor).await?;
                    println!("Deleted candidate {} ({})", deleted.name, deleted.id);
                    Ok(())
                }
                CandidateCommands::Show { .. } | CandidateCommands::Notes { .. } | CandidateCommands::History { .. } => {
                    Ok(())
                }
            }
        }
    }
}

async fn acting(engine: &StatusEngine, actor_id: &Option<String>) -> Result<Actor, WorkflowError> {
    engine.resolve_actor(actor_id.as_deref()).await
}

/// Stderr subscriber; `RUST_LOG` wins over `default_level`
fn subscriber(default_level: &str) -> impl Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| format!("hrflow={},warn", default_level).into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
}

/// The log level lives in the config, so loading it runs under a provisional subscriber
fn load_config<S>(
    bootstrap: S,
    load: impl FnOnce() -> Result<AppConfig, WorkflowError>
) -> Result<AppConfig, WorkflowError>
where
    S: Subscriber + Send + Sync + 'static
{
    tracing::subscriber::with_default(bootstrap, load)
}

struct Output {
    json: bool
}

impl Output {
    fn record<T: Serialize>(&self, value: &T) -> Result<(), WorkflowError> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn table<T: Serialize, R: Tabled>(&self, items: &[T], row: impl Fn(&T) -> R) -> Result<(), WorkflowError> {
        if self.json {
            return self.record(&items);
        }
        if items.is_empty() {
            println!("No entries");
            return Ok(());
        }

        let mut table = Table::new(items.iter().map(row));
        table.with(Style::rounded());
        println!("{}", table);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fmt,
        sync::{Arc, Mutex}
    };

    use hrflow::domain::constant::config;
    use tracing::{
        Event,
        field::{Field, Visit}
    };
    use tracing_subscriber::{Layer, layer::Context};

    use super::*;

    /// Collects the `event` field of every event it sees
    #[derive(Clone, Default)]
    struct EventNames(Arc<Mutex<Vec<String>>>);

    struct EventField(Option<String>);

    impl Visit for EventField {
        fn record_str(&mut self, field: &Field, value: &str) {
            if field.name() == "event" {
                self.0 = Some(value.to_string());
            }
        }

        fn record_debug(&mut self, _field: &Field, _value: &dyn fmt::Debug) {}
    }

    impl<S: Subscriber> Layer<S> for EventNames {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut field = EventField(None);
            event.record(&mut field);
            if let Some(name) = field.0 {
                self.0.lock().unwrap().push(name);
            }
        }
    }

    #[test]
    fn config_events_reach_the_bootstrap_subscriber() {
        let dir = tempfile::tempdir().unwrap();
        let names = EventNames::default();

        let config = load_config(tracing_subscriber::registry().with(names.clone()), || {
            Ok(AppConfig::load_from(dir.path())?)
        })
        .unwrap();

        assert_eq!(config.settings, Settings::default());
        assert_eq!(*names.0.lock().unwrap(), vec![config::CONFIG_DEFAULTED.to_string()]);
    }
}
