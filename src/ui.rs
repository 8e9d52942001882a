use egui::Context;

use crate::controller::UiAction;
use crate::model::LoadState;

/// Values the overlay displays, gathered once per frame
#[derive(Debug, Clone)]
pub struct UiStatus {
    pub load: LoadState,
    pub presenting: bool,
    pub holder: Option<usize>,
    pub group_scale: f32,
    pub axes_visible: bool,
    pub dt: f32,
}

pub fn load_status_text(state: &LoadState) -> String {
    match state {
        LoadState::Pending => "Model: waiting".to_string(),
        LoadState::Loading { loaded, total: Some(total) } if *total > 0 => {
            format!("Model: loading {}%", (loaded.saturating_mul(100) / total).min(100))
        }
        LoadState::Loading { loaded, .. } => format!("Model: loading {} KiB", loaded / 1024),
        LoadState::Ready => "Model: ready".to_string(),
        LoadState::Failed(reason) => format!("Model: failed ({reason})"),
    }
}

/// Build the overlay and return egui output plus the actions clicked this frame
pub fn build_ui(egui_ctx: &Context, raw_input: egui::RawInput, status: &UiStatus) -> (egui::FullOutput, Vec<UiAction>) {
    let mut actions = Vec::new();
    let output = egui_ctx.run(raw_input, |ctx| {
        draw_status_window(ctx, status, &mut actions);
    });
    (output, actions)
}

fn draw_status_window(ctx: &Context, status: &UiStatus, actions: &mut Vec<UiAction>) {
    egui::Window::new("Lung viewer")
        .default_pos([8.0, 8.0])
        .resizable(false)
        .show(ctx, |ui| {
            ui.label(egui::RichText::new(load_status_text(&status.load)).small());
            ui.label(
                egui::RichText::new(format!("FPS: {:.0}", if status.dt > 0.0 { 1.0 / status.dt } else { 0.0 }))
                    .small(),
            );
            ui.label(egui::RichText::new(if status.presenting { "VR: presenting" } else { "VR: desktop" }).small());
            let holder = match status.holder {
                Some(slot) => format!("Held by controller {slot}"),
                None => "Not held".to_string(),
            };
            ui.label(egui::RichText::new(holder).small());
            ui.label(egui::RichText::new(format!("Scale: {:.2}", status.group_scale)).small());
            ui.separator();

            ui.horizontal(|ui| {
                if ui.button("Reset view").clicked() {
                    actions.push(UiAction::ResetView);
                }
                let axes_label = if status.axes_visible { "Hide axes" } else { "Show axes" };
                if ui.button(axes_label).clicked() {
                    actions.push(UiAction::ToggleAxes);
                }
                if ui.add_enabled(status.presenting, egui::Button::new("Exit VR")).clicked() {
                    actions.push(UiAction::ExitVr);
                }
            });
            ui.separator();
            ui.label(egui::RichText::new("Drag - Orbit").small());
            ui.label(egui::RichText::new("Wheel - Zoom").small());
        });
}
