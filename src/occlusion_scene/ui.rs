use crate::occlusion_scene::config::SceneConfig;
use crate::occlusion_scene::simulator::SimulatorStarted;
use bevy::prelude::*;

/// Text channel for the on-screen instruction label.
#[derive(Resource, Debug, Clone, PartialEq, Eq)]
pub struct InstructionText(String);

impl InstructionText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }

    pub fn set(&mut self, text: impl Into<String>) {
        self.0 = text.into();
    }
}

#[derive(Component, Debug, Default)]
pub struct InstructionLabel;

pub fn spawn_instruction_panel(mut commands: Commands, instruction: Res<InstructionText>) {
    commands
        .spawn((
            Name::new("Instruction panel"),
            Node {
                position_type: PositionType::Absolute,
                bottom: px(24),
                left: px(0),
                right: px(0),
                justify_content: JustifyContent::Center,
                ..default()
            },
        ))
        .with_child((
            InstructionLabel,
            Text::new(instruction.text()),
            TextFont::from_font_size(26.0),
            TextColor(Color::srgb(0.96, 0.96, 0.94)),
            TextBackgroundColor(Color::srgba(0.08, 0.10, 0.12, 0.68)),
        ));
}

pub fn sync_instruction_label(
    instruction: Res<InstructionText>,
    mut labels: Query<&mut Text, With<InstructionLabel>>,
) {
    if !instruction.is_changed() {
        return;
    }
    for mut text in &mut labels {
        **text = instruction.text().to_string();
    }
}

pub fn reset_instruction_on_simulator_start(
    mut started: MessageReader<SimulatorStarted>,
    config: Res<SceneConfig>,
    mut instruction: ResMut<InstructionText>,
) {
    if started.read().count() == 0 {
        return;
    }
    if instruction.text() != config.instruction_text {
        instruction.set(config.instruction_text.clone());
    }
}
