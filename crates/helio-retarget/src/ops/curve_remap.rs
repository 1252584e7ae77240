//! Curve remap op: forwards named curve values from the source animation to the target.

use super::{OpInitContext, OpRunContext, RetargetOp};
use crate::retarget_log::RetargetLog;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveRemapEntry {
    pub source_curve: String,
    pub target_curve: String,
    pub scale: f32,
    pub offset: f32,
}

impl Default for CurveRemapEntry {
    fn default() -> Self {
        Self {
            source_curve: String::new(),
            target_curve: String::new(),
            scale: 1.0,
            offset: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveRemapOp {
    pub name: String,
    pub enabled: bool,
    pub remaps: Vec<CurveRemapEntry>,
    /// Pass through curves no entry mentions; when false only remapped curves are output.
    pub copy_unmapped_curves: bool,
}

impl Default for CurveRemapOp {
    fn default() -> Self {
        Self {
            name: "curve_remap".to_string(),
            enabled: true,
            remaps: Vec::new(),
            copy_unmapped_curves: true,
        }
    }
}

impl CurveRemapOp {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_remap(self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.with_scaled_remap(source, target, 1.0, 0.0)
    }

    pub fn with_scaled_remap(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        scale: f32,
        offset: f32,
    ) -> Self {
        self.remaps.push(CurveRemapEntry {
            source_curve: source.into(),
            target_curve: target.into(),
            scale,
            offset,
        });
        self
    }
}

impl RetargetOp for CurveRemapOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, _ctx: &OpInitContext, log: &mut RetargetLog) -> bool {
        if self.remaps.is_empty() {
            log.warn(format!("Curve remap op, {}, has no curves to remap", self.name));
            return false;
        }
        true
    }

    fn run(&mut self, ctx: &mut OpRunContext) {
        if self.copy_unmapped_curves {
            for (name, value) in ctx.input_curves {
                let remapped = self.remaps.iter().any(|r| &r.source_curve == name);
                if !remapped {
                    ctx.output_curves.insert(name.clone(), *value);
                }
            }
        }

        for remap in &self.remaps {
            if let Some(value) = ctx.input_curves.get(&remap.source_curve) {
                ctx.output_curves
                    .insert(remap.target_curve.clone(), value * remap.scale + remap.offset);
            }
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}
