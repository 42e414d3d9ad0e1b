// Demo: walk a scene through edits, undo and redo, logging the history as it goes.
// Set RUST_LOG=debug to see every stack transition.

use anyhow::Context;
use retrace_history::{load_config, HistoryCanvas, HistoryConfig};
use retrace_scene::{Scene, SceneObject};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => load_config(&path)?,
        None => HistoryConfig::default(),
    };

    let mut canvas =
        HistoryCanvas::new(Scene::default(), config).context("attach history to scene")?;

    let id = canvas.edit(|scene| {
        scene.add(
            SceneObject::rect(10.0, 10.0, 120.0, 80.0)
                .with_fill("#d94f30")
                .with_prop("name", "crate"),
        )
    });
    report(&canvas, "added rect");

    canvas.edit(|scene| scene.modify(id, |rect| rect.left = 64.0))?;
    report(&canvas, "moved rect");

    let label = canvas.edit(|scene| scene.add(SceneObject::text(12.0, 120.0, "draft")));
    canvas.edit(|scene| scene.set_text(label, "final"))?;
    canvas.record_undo_point()?;
    report(&canvas, "edited label");

    for _ in 0..4 {
        canvas.undo()?;
        report(&canvas, "undo");
    }
    canvas.redo()?;
    report(&canvas, "redo");

    canvas.clear_history();
    report(&canvas, "cleared");

    let events: Vec<&str> = canvas
        .canvas()
        .history_log()
        .iter()
        .map(|event| event.name())
        .collect();
    info!("Events published: {}", events.join(", "));

    canvas.dispose();
    Ok(())
}

fn report(canvas: &HistoryCanvas<Scene>, step: &str) {
    let history = canvas.history();
    info!(
        undo = history.undo_depth(),
        redo = history.redo_depth(),
        objects = canvas.canvas().objects().len(),
        "{}",
        step
    );
}
