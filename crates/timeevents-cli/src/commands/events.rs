use clap::Subcommand;

use super::block_on;
use super::sync::offline_engine;

#[derive(Subcommand)]
pub enum EventsAction {
    /// List cached time events
    List {
        /// Only events of this employee
        #[arg(short, long)]
        employee: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: EventsAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        EventsAction::List { employee, json } => {
            let engine = offline_engine()?;
            let events = block_on(engine.cached_events(employee.as_deref()))??;

            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
                return Ok(());
            }
            if events.is_empty() {
                println!("No cached time events.");
                return Ok(());
            }
            for record in &events {
                let event = &record.event;
                println!(
                    "{} {} {:<10} {:<10} {}{}",
                    event.event_date.as_deref().unwrap_or("-"),
                    event.event_time.as_deref().unwrap_or("-"),
                    event.status_text.as_deref().unwrap_or("-"),
                    event.req_id().unwrap_or("-"),
                    event.employee_id.as_deref().unwrap_or("-"),
                    if record.is_posted { "  [posted]" } else { "" },
                );
            }
        }
    }
    Ok(())
}
