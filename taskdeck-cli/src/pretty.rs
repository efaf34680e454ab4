use anyhow::Result;
use std::io::Write;
use taskdeck::tasks::{Task, TaskStatus};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

pub fn pp_task(task: &Task) -> Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Always);

    stdout.set_color(ColorSpec::new().set_dimmed(true))?;
    write!(&mut stdout, "{:>6}  ", task.id)?;
    stdout.reset()?;

    match task.status {
        TaskStatus::Done => {
            stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        }
        TaskStatus::Pending => {
            stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true))?;
        }
    }
    write!(&mut stdout, "{:<8}", task.status.to_string())?;
    stdout.reset()?;

    writeln!(&mut stdout, " {}", task.title)?;
    Ok(())
}

pub fn pp_task_list(tasks: &[Task]) -> Result<()> {
    if tasks.is_empty() {
        let mut stdout = StandardStream::stdout(ColorChoice::Always);
        stdout.set_color(ColorSpec::new().set_dimmed(true).set_italic(true))?;
        writeln!(&mut stdout, "no tasks")?;
        stdout.reset()?;
        return Ok(());
    }
    for task in tasks {
        pp_task(task)?;
    }
    Ok(())
}
