use console::style;
use std::io::Write;
use vidscribe_core::PipelineState;

/// Overwrite the current status line on stderr
pub fn print_status(message: &str, progress: Option<f32>) {
    let line = match progress {
        Some(p) => format!("{message} {:>3}%", (p * 100.0).round() as u32),
        None => message.to_string(),
    };
    eprint!("\r\x1b[2K{line}");
    std::io::stderr().flush().ok();
}

/// Status line for a pipeline state
pub fn print_state(state: PipelineState, progress: Option<f32>) {
    let label = match state {
        PipelineState::Succeeded => style(state.label()).green().bold().to_string(),
        _ => state.label().to_string(),
    };
    print_status(&label, progress);
    if state == PipelineState::Succeeded {
        eprintln!();
    }
}

pub fn print_error(message: &str) {
    eprintln!("\r\x1b[2K{} {message}", style("Error:").red().bold());
}
