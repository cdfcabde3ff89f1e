/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Relays messages between Telegram channels using the tasks from a task file.
//!
//! Environment variables:
//! * `TELOXIDE_TOKEN`: the bot token
//! * `RELAY_TASKS`: path to the task file, `steering_tasks.json` by default
//! * `RELAY_SETTINGS`: path to an optional JSON file with [`EngineSettings`]

use std::env;

use color_eyre::{
	Result,
	eyre::{WrapErr, eyre},
};
use relay::{
	Supervisor,
	cancellation_token::CancellationToken,
	persistence::JsonFile,
	platform::telegram::TelegramPlatform,
	scaffold::{set_up_ctrl_c_handler, set_up_logging},
	settings::EngineSettings,
};
use teloxide::Bot;

const DEFAULT_TASK_FILE: &str = "steering_tasks.json";

fn main() -> Result<()> {
	color_eyre::install()?;

	// the local time offset can only be determined reliably before the runtime spawns its threads
	set_up_logging().wrap_err("Can't set up logging")?;
	async_main()
}

#[tokio::main]
async fn async_main() -> Result<()> {
	let shutdown_token = set_up_ctrl_c_handler();

	let settings = load_settings().await?;
	let task_file = env::var("RELAY_TASKS").unwrap_or_else(|_| DEFAULT_TASK_FILE.to_owned());

	let token = env::var("TELOXIDE_TOKEN").wrap_err("TELOXIDE_TOKEN is not set")?;
	let platform = TelegramPlatform::new(Bot::new(token));
	let username = platform
		.authenticate()
		.await
		.wrap_err("Telegram authentication failed")?;
	tracing::info!("Logged in as @{username}");

	let supervisor = Supervisor::new(platform.clone(), JsonFile::new(&task_file), settings);
	supervisor
		.load()
		.await
		.wrap_err_with(|| format!("Can't load tasks from {task_file}"))?;
	supervisor.reconcile().await;
	tracing::info!("{}", supervisor.status());

	let (run_token, stop_supervisor) = CancellationToken::new();
	let runner = {
		let supervisor = supervisor.clone();
		tokio::spawn(async move { supervisor.run(run_token).await })
	};

	// returns on Ctrl-C or if Telegram stopped serving updates
	let polled = platform.poll_updates(shutdown_token).await;

	stop_supervisor.stop();
	runner
		.await
		.map_err(|e| eyre!("Supervisor crashed: {e}"))?;

	polled.wrap_err("Can't receive updates from Telegram")?;
	Ok(())
}

async fn load_settings() -> Result<EngineSettings> {
	let Ok(path) = env::var("RELAY_SETTINGS") else {
		return Ok(EngineSettings::default());
	};

	let contents = tokio::fs::read_to_string(&path)
		.await
		.wrap_err_with(|| format!("Can't read settings file {path}"))?;

	serde_json::from_str(&contents).wrap_err_with(|| format!("Settings file {path} is invalid"))
}
