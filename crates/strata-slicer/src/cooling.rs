//! Layer cooling: minimum layer time and fan speed.

use tracing::debug;

use crate::planner::LayerPlan;
use crate::settings::Settings;

/// Cooling decisions for one layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerCooling {
    /// Layer time before slowing down (s).
    pub layer_time: f64,
    /// Fan speed (%).
    pub fan_speed: f64,
}

/// Fan speed for a layer that takes `layer_time` seconds unscaled.
///
/// Short layers get the maximum fan speed, long ones the minimum, with a
/// linear ramp between the two time thresholds. Layers below
/// `cool_fan_full_layer` scale the result down.
pub fn fan_speed(settings: &Settings, layer_nr: usize, layer_time: f64) -> f64 {
    let min_time = settings.cool_min_layer_time;
    let max_time = settings.cool_min_layer_time_fan_speed_max;
    let fan_min = settings.cool_fan_speed_min;
    let fan_max = settings.cool_fan_speed_max;

    let mut fan = fan_min;
    if layer_time < min_time {
        fan = fan_max;
    } else if layer_time < max_time && max_time > min_time {
        let ratio = (layer_time - min_time) / (max_time - min_time);
        fan = fan_max - (fan_max - fan_min) * ratio;
    }

    let full_layer = settings.cool_fan_full_layer;
    if layer_nr < full_layer {
        fan = fan * layer_nr as f64 / full_layer as f64;
    }
    fan
}

/// Enforce the minimum layer time on `plan` and pick the fan speed.
pub fn cool_layer(plan: &mut LayerPlan, settings: &Settings, layer_nr: usize) -> LayerCooling {
    let (travel_time, extrude_time) = plan.get_times();
    plan.force_minimal_layer_time(
        settings.cool_min_layer_time,
        settings.cool_min_speed,
        travel_time,
        extrude_time,
    );
    let layer_time = travel_time + extrude_time;
    let fan = fan_speed(settings, layer_nr, layer_time);
    debug!(
        layer = layer_nr,
        layer_time,
        fan,
        extra_time = plan.extra_time(),
        "layer cooling"
    );
    LayerCooling {
        layer_time,
        fan_speed: fan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn settings() -> Settings {
        Settings {
            cool_min_layer_time: 5.0,
            cool_min_layer_time_fan_speed_max: 10.0,
            cool_fan_speed_min: 40.0,
            cool_fan_speed_max: 100.0,
            cool_fan_full_layer: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_fan_ramp() {
        let s = settings();
        assert_relative_eq!(fan_speed(&s, 5, 3.0), 100.0);
        assert_relative_eq!(fan_speed(&s, 5, 7.5), 70.0);
        assert_relative_eq!(fan_speed(&s, 5, 12.0), 40.0);
    }

    #[test]
    fn test_fan_first_layers() {
        let s = settings();
        assert_relative_eq!(fan_speed(&s, 0, 3.0), 0.0);
        assert_relative_eq!(fan_speed(&s, 1, 3.0), 50.0);
        assert_relative_eq!(fan_speed(&s, 2, 3.0), 100.0);
    }
}
