use std::{collections::BTreeSet, sync::Arc};

use anyhow::Context;
use checkin_alarms::{
    alarm::{AlarmId, AlarmTime, RepeatDay},
    appsettings::AppSettings,
    notification::{
        BackgroundlessNotificationScheduler, InProcessNotificationScheduler, LogDeliveryChannel,
        NotificationScheduler,
    },
    scheduling::{AlarmScheduler, ScheduleOutcome, SystemClock},
    service::AlarmService,
    storage::{AlarmStore, FileKeyValueStore},
};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show every saved alarm.
    List,
    Add {
        /// HH:MM, 24-hour.
        time: AlarmTime,
        /// Repeat on this day; may be given several times. None means every day.
        #[clap(long, short)]
        day: Vec<RepeatDay>,
        #[clap(long, short)]
        name: Option<String>,
        #[clap(long)]
        disabled: bool,
    },
    Edit {
        id: String,
        #[clap(long, short)]
        time: Option<AlarmTime>,
        #[clap(long, short, conflicts_with = "every_day")]
        day: Vec<RepeatDay>,
        #[clap(long)]
        every_day: bool,
        #[clap(long, short)]
        name: Option<String>,
    },
    Toggle {
        id: String,
        state: ToggleState,
    },
    Delete {
        id: String,
    },
    /// Show the live notifications of one alarm.
    Scheduled {
        id: String,
    },
    /// Fire a notification right away.
    Test,
    /// Keep notifications alive and renew them periodically until interrupted.
    Run,
}

#[derive(Clone, Copy, ValueEnum)]
enum ToggleState {
    On,
    Off,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();

    let cli = Cli::parse();
    let settings = AppSettings::load().context("Unable to load settings")?;
    let service = build_service(&settings).await?;

    match cli.command {
        Command::List => {
            for alarm in service.list().await? {
                let days = if alarm.repeat_days.is_empty() {
                    "every day".to_owned()
                } else {
                    alarm
                        .repeat_days
                        .iter()
                        .map(|day| day.as_str())
                        .collect::<Vec<_>>()
                        .join(",")
                };
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    alarm.id,
                    alarm.time,
                    days,
                    if alarm.enabled { "on" } else { "off" },
                    alarm.name.as_deref().unwrap_or("")
                );
            }
        }
        Command::Add {
            time,
            day,
            name,
            disabled,
        } => {
            let mut alarm = service.new_alarm();
            alarm.time = time;
            alarm.repeat_days = day.into_iter().collect();
            alarm.name = name;
            alarm.enabled = !disabled;

            let id = alarm.id.clone();
            report(service.save(alarm).await?);
            println!("{id}");
        }
        Command::Edit {
            id,
            time,
            day,
            every_day,
            name,
        } => {
            let id = AlarmId::from(id);
            let mut alarm = service
                .get(&id)
                .await?
                .with_context(|| format!("Alarm {id} does not exist"))?;

            if let Some(time) = time {
                alarm.time = time;
            }
            if every_day {
                alarm.repeat_days = BTreeSet::new();
            } else if !day.is_empty() {
                alarm.repeat_days = day.into_iter().collect();
            }
            if name.is_some() {
                alarm.name = name;
            }

            report(service.save(alarm).await?);
        }
        Command::Toggle { id, state } => {
            let enabled = matches!(state, ToggleState::On);
            report(service.toggle(&AlarmId::from(id), enabled).await?);
        }
        Command::Delete { id } => {
            let id = AlarmId::from(id);
            if !service.delete(&id).await? {
                println!("No alarm {id}");
            }
        }
        Command::Scheduled { id } => {
            for notification in service.scheduled_notifications(&AlarmId::from(id)).await? {
                println!("{}\t{:?}", notification.identifier, notification.trigger);
            }
        }
        Command::Test => {
            let identifier = service.send_test_notification().await?;
            println!("{identifier}");
        }
        Command::Run => run(&service, &settings).await?,
    }

    Ok(())
}

async fn build_service(settings: &AppSettings) -> anyhow::Result<AlarmService> {
    let kv = FileKeyValueStore::open(&settings.storage.path)
        .await
        .with_context(|| {
            format!(
                "Unable to open alarm storage at {}",
                settings.storage.path.display()
            )
        })?;
    let store = Arc::new(AlarmStore::new(Arc::new(kv)));

    let notifications: Arc<dyn NotificationScheduler> =
        if settings.notifications.background_scheduling {
            let scheduler = InProcessNotificationScheduler::new(
                Arc::new(LogDeliveryChannel),
                settings.notifications.timezone,
                settings.in_process_options(),
            );
            Arc::new(scheduler)
        } else {
            Arc::new(BackgroundlessNotificationScheduler)
        };

    let scheduler = Arc::new(AlarmScheduler::new(
        Arc::clone(&store),
        notifications,
        Arc::new(SystemClock::new(settings.notifications.timezone)),
        settings.scheduling_options(),
    ));

    Ok(AlarmService::new(store, scheduler))
}

async fn run(service: &AlarmService, settings: &AppSettings) -> anyhow::Result<()> {
    let mut renewal = tokio::time::interval(settings.daemon.renewal_interval());
    log::info!(
        "Alarm daemon started. [timezone = {}, renewal_interval_secs = {}]",
        settings.notifications.timezone,
        settings.daemon.renewal_interval().as_secs()
    );

    loop {
        tokio::select! {
            _ = renewal.tick() => {
                if let Err(error) = service.restore().await {
                    log::error!("Unable to restore alarms. [error = {error}]");
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("Unable to listen for shutdown signal")?;
                log::info!("Shutting down.");
                return Ok(());
            }
        }
    }
}

fn report(outcome: ScheduleOutcome) {
    match outcome {
        ScheduleOutcome::Scheduled { identifiers } => {
            println!("Scheduled {} notification(s)", identifiers.len())
        }
        ScheduleOutcome::Unsupported => {
            println!("Saved; background notifications are unavailable on this platform")
        }
        ScheduleOutcome::Disabled => println!("Saved; alarm is off"),
    }
}
