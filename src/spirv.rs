//! SPIR-V reflection output.
//!
//! The reflection parser itself is an external collaborator (§1): it
//! reads a shader module's SPIR-V and reports the descriptor-set layouts
//! the module expects. This module only defines the shape of its output
//! so that [`crate::pipeline_factory`] can consume it; it does not parse
//! SPIR-V bytecode itself.

use ash::vk;

#[derive(Debug, Clone)]
pub struct ReflectedBinding {
    pub set: u32,
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub name: String,
}

/// The set of descriptor-set layouts a shader module (or a linked group
/// of stages) declares, as reported by the reflection component.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub sets: Vec<Vec<ReflectedBinding>>,
}

impl ParseResult {
    pub fn num_sets(&self) -> u32 {
        self.sets.len() as u32
    }
}
