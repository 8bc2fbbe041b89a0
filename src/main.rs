use authority_sync::config::SyncConfig;
use authority_sync::game_logic::{OwnerId, ScriptedInput};
use authority_sync::session::LoopbackSession;
use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use std::time::Duration;

const DEFAULT_RUN_SECONDS: f32 = 10.0;
const REPORT_EVERY_SECONDS: f32 = 2.0;

#[derive(Resource)]
struct DemoRun {
    duration: f32,
    next_report: f32,
}

fn main() {
    // authority_sync [config.json] [seconds]
    let mut args = std::env::args().skip(1);

    let config = match args.next() {
        Some(path) => match SyncConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => SyncConfig::default(),
    };

    let duration = match args.next().map(|arg| arg.parse::<f32>()) {
        Some(Ok(seconds)) if seconds > 0.0 => seconds,
        Some(_) => {
            eprintln!("Run length must be a positive number of seconds");
            std::process::exit(1);
        }
        None => DEFAULT_RUN_SECONDS,
    };

    let session = match build_session(&config) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Failed to set up session: {}", e);
            std::process::exit(1);
        }
    };

    // Headless: the runner paces frames at the client timestep
    App::new()
        .add_plugins((
            MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f32(
                config.client_timestep,
            ))),
            LogPlugin::default(),
        ))
        .insert_resource(config)
        .insert_resource(session)
        .insert_resource(DemoRun {
            duration,
            next_report: REPORT_EVERY_SECONDS,
        })
        .add_systems(Update, (step_session, report_progress, finish_run).chain())
        .run();
}

// One host player inside the authority, two players over the loopback network
fn build_session(config: &SyncConfig) -> authority_sync::Result<LoopbackSession> {
    let mut session =
        LoopbackSession::new(config).with_host(OwnerId(1), ScriptedInput::circle(2.5))?;
    session.add_client(OwnerId(2), ScriptedInput::zigzag(30))?;
    session.add_client(OwnerId(3), ScriptedInput::circle(-4.0))?;
    Ok(session)
}

// Fixed client step so runs are reproducible regardless of wall-clock hiccups
fn step_session(config: Res<SyncConfig>, mut session: ResMut<LoopbackSession>) {
    session.step_frame(config.client_timestep);
}

fn report_progress(session: Res<LoopbackSession>, mut run: ResMut<DemoRun>) {
    if session.elapsed() < run.next_report {
        return;
    }
    run.next_report += REPORT_EVERY_SECONDS;

    let summary = session.summary();
    info!(
        "t={:.1}s ticks={} corrections={} confirmations={}",
        summary.elapsed,
        summary.ticks,
        summary.corrections(),
        summary.confirmations()
    );
}

fn finish_run(session: Res<LoopbackSession>, run: Res<DemoRun>, mut exit: EventWriter<AppExit>) {
    if session.elapsed() >= run.duration {
        session.log_summary();
        exit.send(AppExit::Success);
    }
}
