//! WGSL front end: naga parses and validates each stage, then the module is
//! reflected for the names GL-style binding needs.

use monet_render::ShaderStage;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, Handle, Module, Type, TypeInner};

/// A validated stage and the entry point it contributes.
#[derive(Debug)]
pub(crate) struct StageIr {
    pub module: Module,
    pub entry_point: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UniformDecl {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub size: u64,
}

fn naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    }
}

/// Parses and validates `source`; the error is naga's rendered diagnostic.
pub(crate) fn parse_stage(stage: ShaderStage, source: &str) -> Result<StageIr, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| e.emit_to_string(source))?;

    let wanted = naga_stage(stage);
    let entry_point = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == wanted)
        .map(|ep| ep.name.clone())
        .ok_or_else(|| format!("no @{stage} entry point"))?;

    Ok(StageIr {
        module,
        entry_point,
    })
}

fn entry(ir: &StageIr) -> Option<&naga::EntryPoint> {
    ir.module
        .entry_points
        .iter()
        .find(|ep| ep.name == ir.entry_point)
}

fn collect_locations(
    module: &Module,
    name: Option<&str>,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    found: &mut Vec<(String, u32)>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => {
            found.push((name.unwrap_or_default().to_string(), *location));
        }
        Some(_) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    if let Some(Binding::Location { location, .. }) = &member.binding {
                        found.push((member.name.clone().unwrap_or_default(), *location));
                    }
                }
            }
        }
    }
}

/// `(name, location)` for every `@location` input of the entry point, struct
/// members included.
pub(crate) fn inputs(ir: &StageIr) -> Vec<(String, u32)> {
    let mut found = Vec::new();
    if let Some(ep) = entry(ir) {
        for arg in &ep.function.arguments {
            collect_locations(
                &ir.module,
                arg.name.as_deref(),
                arg.ty,
                arg.binding.as_ref(),
                &mut found,
            );
        }
    }
    found
}

/// `(name, location)` for every `@location` output of the entry point.
pub(crate) fn outputs(ir: &StageIr) -> Vec<(String, u32)> {
    let mut found = Vec::new();
    if let Some(result) = entry(ir).and_then(|ep| ep.function.result.as_ref()) {
        collect_locations(
            &ir.module,
            None,
            result.ty,
            result.binding.as_ref(),
            &mut found,
        );
    }
    found
}

/// Every `var<uniform>` with a resource binding.
pub(crate) fn uniforms(module: &Module) -> Vec<UniformDecl> {
    module
        .global_variables
        .iter()
        .filter(|(_, var)| var.space == AddressSpace::Uniform)
        .filter_map(|(_, var)| {
            let binding = var.binding.as_ref()?;
            Some(UniformDecl {
                name: var.name.clone()?,
                group: binding.group,
                binding: binding.binding,
                size: u64::from(module.types[var.ty].inner.size(module.to_ctx())),
            })
        })
        .collect()
}

/// Checks the two stages fit together and merges their uniforms by binding.
pub(crate) fn link(vertex: &StageIr, fragment: &StageIr) -> Result<Vec<UniformDecl>, String> {
    let produced: Vec<u32> = outputs(vertex).into_iter().map(|(_, loc)| loc).collect();
    for (name, location) in inputs(fragment) {
        if !produced.contains(&location) {
            return Err(format!(
                "fragment input `{name}` at @location({location}) has no matching vertex output"
            ));
        }
    }

    let mut merged: Vec<UniformDecl> = Vec::new();
    for decl in uniforms(&vertex.module)
        .into_iter()
        .chain(uniforms(&fragment.module))
    {
        if decl.group != 0 {
            return Err(format!(
                "uniform `{}` is in @group({}); only @group(0) is bound",
                decl.name, decl.group
            ));
        }
        match merged.iter().find(|d| d.binding == decl.binding || d.name == decl.name) {
            Some(existing) if *existing == decl => {}
            Some(existing) => {
                return Err(format!(
                    "uniform `{}` at @binding({}) conflicts with `{}` at @binding({})",
                    decl.name, decl.binding, existing.name, existing.binding
                ));
            }
            None => merged.push(decl),
        }
    }
    merged.sort_by_key(|d| d.binding);
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use monet_render::builtin::{SOLID_COLOR_WGSL_FRAGMENT, SOLID_COLOR_WGSL_VERTEX};

    #[test]
    fn solid_color_reflects() {
        let vertex = parse_stage(ShaderStage::Vertex, SOLID_COLOR_WGSL_VERTEX).unwrap();
        let fragment = parse_stage(ShaderStage::Fragment, SOLID_COLOR_WGSL_FRAGMENT).unwrap();
        assert_eq!(vertex.entry_point, "vs_main");
        assert_eq!(fragment.entry_point, "fs_main");

        let mut names = inputs(&vertex);
        names.sort_by_key(|(_, loc)| *loc);
        assert_eq!(
            names,
            vec![
                ("position".to_string(), 0),
                ("instance_position".to_string(), 1),
                ("instance_direction".to_string(), 2),
                ("instance_color".to_string(), 3),
            ]
        );

        let merged = link(&vertex, &fragment).unwrap();
        let summary: Vec<(&str, u32, u64)> = merged
            .iter()
            .map(|d| (d.name.as_str(), d.binding, d.size))
            .collect();
        assert_eq!(summary, vec![("view", 0, 64), ("perspective", 1, 64)]);
    }

    #[test]
    fn syntax_error_is_reported() {
        let err = parse_stage(ShaderStage::Vertex, "@vertex fn vs_main( {").unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn wrong_stage_is_reported() {
        let err = parse_stage(ShaderStage::Vertex, SOLID_COLOR_WGSL_FRAGMENT).unwrap_err();
        assert_eq!(err, "no @vertex entry point");
    }

    #[test]
    fn unmatched_fragment_input_fails_link() {
        let vertex = parse_stage(ShaderStage::Vertex, SOLID_COLOR_WGSL_VERTEX).unwrap();
        let fragment = parse_stage(
            ShaderStage::Fragment,
            "@fragment fn fs_main(@location(4) glow: f32) -> @location(0) vec4<f32> { return vec4<f32>(glow); }",
        )
        .unwrap();
        assert!(link(&vertex, &fragment).unwrap_err().contains("@location(4)"));
    }
}
