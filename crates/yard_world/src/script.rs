use yard_core::world::World;
use yard_core::Command;

use crate::host::MemoryWorld;
use crate::scenario::{ScriptAction, ScriptEntry};

/// Apply every host change scheduled for `tick` and return the operator
/// commands due at the same tick, in script order.
pub fn apply_due(world: &mut MemoryWorld, script: &[ScriptEntry], tick: u64) -> Vec<Command> {
    let mut commands = Vec::new();
    for entry in script.iter().filter(|e| e.at_tick == tick) {
        match &entry.action {
            ScriptAction::Command { command } => commands.push(command.clone()),
            ScriptAction::Move {
                structure,
                velocity,
            } => world.set_velocity(structure, *velocity),
            ScriptAction::Split {
                structure,
                into,
                blocks,
            } => {
                world.split(structure, into, blocks);
            }
            ScriptAction::Destroy { structure } => world.destroy(structure),
            ScriptAction::AddCargo {
                inventory,
                item,
                count,
            } => world.add_cargo(inventory, item, *count),
            ScriptAction::RemoveCargo {
                inventory,
                item,
                count,
            } => {
                world.pull_items(std::slice::from_ref(inventory), item, *count);
            }
            ScriptAction::DisableTool { tool } => world.set_tool_enabled(tool, false),
            ScriptAction::BreakFrame { yard } => world.break_frame(yard),
        }
    }
    commands
}
