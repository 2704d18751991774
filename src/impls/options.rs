//! Analysis option-related API methods for EPANET.

use crate::epanet_error::*;
use crate::types::curve::CurveType;
use crate::types::options::{
    AnalysisOption, FlowUnits, HeadLossType, PressUnits, QualityType, StatusReport,
};
use crate::types::QualityAnalysisInfo;
use crate::units::{SEC_PER_DAY, Ucf};
use crate::EPANET;
use num_traits::FromPrimitive;

/// ## Analysis Option APIs
impl EPANET {
    /// Retrieves an analysis option value in user units.
    pub fn get_option(&self, option: AnalysisOption) -> Result<f64> {
        let pr = &self.project;
        let hyd = &pr.hyd;
        let qual = &pr.qual;
        let value = match option {
            AnalysisOption::Trials => hyd.max_iter as f64,
            AnalysisOption::Accuracy => hyd.accuracy,
            AnalysisOption::Tolerance => qual.ctol,
            AnalysisOption::EmitExpon => hyd.qexp,
            AnalysisOption::DemandMult => hyd.dmult,
            AnalysisOption::HeadError => hyd.head_error * pr.ucf.elev,
            AnalysisOption::FlowChange => hyd.flow_change * pr.ucf.flow,
            AnalysisOption::HeadLossForm => hyd.headloss_form as i32 as f64,
            AnalysisOption::GlobalEffic => hyd.epump,
            AnalysisOption::GlobalPrice => hyd.eprice,
            AnalysisOption::GlobalPattern => hyd.epat as f64,
            AnalysisOption::DemandCharge => hyd.dcharge,
            AnalysisOption::SpGravity => hyd.spgrav,
            AnalysisOption::SpViscos => hyd.viscos,
            AnalysisOption::Unbalanced => hyd.extra_iter as f64,
            AnalysisOption::CheckFreq => hyd.check_freq as f64,
            AnalysisOption::MaxCheck => hyd.max_check as f64,
            AnalysisOption::DampLimit => hyd.damp_limit,
            AnalysisOption::SpDiffus => qual.diffus,
            AnalysisOption::BulkOrder => qual.bulk_order,
            AnalysisOption::WallOrder => qual.wall_order,
            AnalysisOption::TankOrder => qual.tank_order,
            AnalysisOption::ConcenLimit => qual.climit,
            AnalysisOption::DemandPattern => hyd.def_pat as f64,
            AnalysisOption::EmitBackflow => hyd.emit_backflow as i32 as f64,
            AnalysisOption::PressUnits => pr.press_units as i32 as f64,
            AnalysisOption::StatusReport => pr.report.statflag as i32 as f64,
        };
        Ok(value)
    }

    /// Sets an analysis option, converting from user units.
    pub fn set_option(&mut self, option: AnalysisOption, value: f64) -> Result<()> {
        let result = self.set_option_inner(option, value);
        check_error_with_context(result, format!("Failed to set option {option:?} = {value}"))
    }

    fn set_option_inner(&mut self, option: AnalysisOption, value: f64) -> EngineResult<()> {
        let pr = &mut self.project;
        match option {
            AnalysisOption::Trials => {
                if value < 1.0 {
                    return Err(ErrorCode::IllegalNumericValue);
                }
                pr.hyd.max_iter = value as i32;
            }
            AnalysisOption::Accuracy => {
                if value <= 0.0 {
                    return Err(ErrorCode::IllegalNumericValue);
                }
                pr.hyd.accuracy = value;
            }
            AnalysisOption::Tolerance => {
                if value < 0.0 {
                    return Err(ErrorCode::IllegalNumericValue);
                }
                pr.qual.ctol = value;
            }
            AnalysisOption::EmitExpon => {
                if value <= 0.0 {
                    return Err(ErrorCode::IllegalNumericValue);
                }
                // Emitter coefficients are stored against the exponent;
                // preserve each node's user-facing coefficient.
                let old_qexp = pr.hyd.qexp;
                let ucf = pr.ucf;
                for i in 1..=pr.network.njuncs {
                    let node = &mut pr.network.nodes[i];
                    if node.ke > 0.0 {
                        let user = node.ke * ucf.flow / ucf.pressure.powf(old_qexp);
                        node.ke = user * ucf.pressure.powf(value) / ucf.flow;
                    }
                }
                pr.hyd.qexp = value;
            }
            AnalysisOption::DemandMult => {
                if value < 0.0 {
                    return Err(ErrorCode::IllegalNumericValue);
                }
                pr.hyd.dmult = value;
            }
            AnalysisOption::HeadError => pr.hyd.head_error = value / pr.ucf.elev,
            AnalysisOption::FlowChange => pr.hyd.flow_change = value / pr.ucf.flow,
            AnalysisOption::HeadLossForm => {
                let form = HeadLossType::from_i32(value as i32)
                    .ok_or(ErrorCode::IllegalParameterCode)?;
                pr.hyd.headloss_form = form;
                pr.update_resistances();
            }
            AnalysisOption::GlobalEffic => {
                if !(1.0..=100.0).contains(&value) {
                    return Err(ErrorCode::IllegalNumericValue);
                }
                pr.hyd.epump = value;
            }
            AnalysisOption::GlobalPrice => pr.hyd.eprice = value,
            AnalysisOption::GlobalPattern => {
                let p = value as i32;
                if p != 0 {
                    pr.network.pattern(p)?;
                }
                pr.hyd.epat = p;
            }
            AnalysisOption::DemandCharge => pr.hyd.dcharge = value,
            AnalysisOption::SpGravity => {
                if value <= 0.0 {
                    return Err(ErrorCode::IllegalNumericValue);
                }
                pr.hyd.spgrav = value;
                pr.refresh_units();
            }
            AnalysisOption::SpViscos => {
                if value <= 0.0 {
                    return Err(ErrorCode::IllegalNumericValue);
                }
                pr.hyd.viscos = value;
            }
            AnalysisOption::Unbalanced => pr.hyd.extra_iter = value as i32,
            AnalysisOption::CheckFreq => pr.hyd.check_freq = (value as i32).max(1),
            AnalysisOption::MaxCheck => pr.hyd.max_check = (value as i32).max(1),
            AnalysisOption::DampLimit => pr.hyd.damp_limit = value.max(0.0),
            AnalysisOption::SpDiffus => pr.qual.diffus = value.max(0.0),
            AnalysisOption::BulkOrder => pr.qual.bulk_order = value,
            AnalysisOption::WallOrder => {
                if value != 0.0 && value != 1.0 {
                    return Err(ErrorCode::IllegalNumericValue);
                }
                pr.qual.wall_order = value;
            }
            AnalysisOption::TankOrder => pr.qual.tank_order = value,
            AnalysisOption::ConcenLimit => pr.qual.climit = value.max(0.0),
            AnalysisOption::DemandPattern => {
                let p = value as i32;
                if p != 0 {
                    pr.network.pattern(p)?;
                }
                pr.hyd.def_pat = p;
            }
            AnalysisOption::EmitBackflow => pr.hyd.emit_backflow = value != 0.0,
            AnalysisOption::PressUnits => {
                pr.press_units = PressUnits::from_i32(value as i32)
                    .ok_or(ErrorCode::IllegalParameterCode)?;
                pr.refresh_units();
            }
            AnalysisOption::StatusReport => {
                pr.report.statflag = StatusReport::from_i32(value as i32)
                    .ok_or(ErrorCode::IllegalParameterCode)?;
            }
        }
        Ok(())
    }

    pub fn get_flow_units(&self) -> Result<FlowUnits> {
        Ok(self.project.flow_units)
    }

    /// Changes the project's flow units, rescaling every stored curve point
    /// so the physical curves are unchanged.
    pub fn set_flow_units(&mut self, flow_units: FlowUnits) -> Result<()> {
        let pr = &mut self.project;
        let old = pr.ucf;
        pr.flow_units = flow_units;
        pr.press_units = Ucf::default_press_units(flow_units);
        pr.refresh_units();
        let new = pr.ucf;

        let flow_ratio = new.flow / old.flow;
        let elev_ratio = new.elev / old.elev;
        let vol_ratio = new.volume / old.volume;
        for curve in pr.network.curves.iter_mut().skip(1) {
            match curve.ctype {
                CurveType::VolumeCurve => {
                    curve.x.iter_mut().for_each(|x| *x *= elev_ratio);
                    curve.y.iter_mut().for_each(|y| *y *= vol_ratio);
                }
                CurveType::PumpCurve | CurveType::HLossCurve => {
                    curve.x.iter_mut().for_each(|x| *x *= flow_ratio);
                    curve.y.iter_mut().for_each(|y| *y *= elev_ratio);
                }
                CurveType::EfficCurve => {
                    curve.x.iter_mut().for_each(|x| *x *= flow_ratio);
                }
                CurveType::GenericCurve => {}
            }
        }
        Ok(())
    }

    pub fn get_quality_info(&self) -> Result<QualityAnalysisInfo> {
        let qual = &self.project.qual;
        Ok(QualityAnalysisInfo {
            quality_type: qual.qualflag,
            chem_name: qual.chem_name.clone(),
            chem_units: qual.chem_units.clone(),
            trace_node_index: qual.trace_node,
        })
    }

    pub fn get_quality_type(&self) -> Result<QualityType> {
        Ok(self.project.qual.qualflag)
    }

    /// Selects the water-quality analysis type. `trace_node` names the
    /// source node for trace analyses and is ignored otherwise.
    pub fn set_quality_type(
        &mut self,
        quality_type: QualityType,
        chem_name: &str,
        chem_units: &str,
        trace_node: &str,
    ) -> Result<()> {
        let qual = &mut self.project.qual;
        match quality_type {
            QualityType::Trace => {
                let node = self.project.network.find_node(trace_node);
                if node == 0 {
                    return Err(ErrorCode::UndefinedTraceNode.into());
                }
                let qual = &mut self.project.qual;
                qual.qualflag = QualityType::Trace;
                qual.trace_node = node;
                qual.chem_name = "Trace".to_string();
                qual.chem_units = "percent".to_string();
            }
            QualityType::Age => {
                qual.qualflag = QualityType::Age;
                qual.chem_name = "Age".to_string();
                qual.chem_units = "hrs".to_string();
            }
            QualityType::Chem => {
                qual.qualflag = QualityType::Chem;
                qual.chem_name = if chem_name.is_empty() {
                    "Chemical".to_string()
                } else {
                    chem_name.to_string()
                };
                qual.chem_units = if chem_units.is_empty() {
                    "mg/L".to_string()
                } else {
                    chem_units.to_string()
                };
            }
            QualityType::None => qual.qualflag = QualityType::None,
        }
        Ok(())
    }

    /// The global bulk/wall reaction coefficients, 1/day, settable through
    /// the reaction options of the INP format.
    pub fn set_global_reaction(&mut self, bulk_per_day: f64, wall_per_day: f64) -> Result<()> {
        self.project.qual.kbulk = bulk_per_day / SEC_PER_DAY;
        self.project.qual.kwall = wall_per_day / SEC_PER_DAY;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::test_utils::fixtures::*;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[rstest]
    fn every_option_reads_back(ph: EPANET) {
        for option in AnalysisOption::iter() {
            assert!(ph.get_option(option).is_ok(), "option {option:?}");
        }
    }

    #[rstest]
    fn numeric_options_round_trip(mut ph: EPANET) {
        ph.set_option(AnalysisOption::Trials, 77.0).unwrap();
        assert_eq!(ph.get_option(AnalysisOption::Trials).unwrap(), 77.0);
        ph.set_option(AnalysisOption::Accuracy, 0.005).unwrap();
        assert_eq!(ph.get_option(AnalysisOption::Accuracy).unwrap(), 0.005);
        let result = ph.set_option(AnalysisOption::Accuracy, -1.0);
        assert_eq!(result.unwrap_err(), EPANETError::from(202));
    }

    #[rstest]
    fn flow_unit_change_rescales_pump_curve(mut ph: EPANET) {
        let before = ph.get_curve_by_id("1").unwrap();
        ph.set_flow_units(FlowUnits::Lps).unwrap();
        let after = ph.get_curve_by_id("1").unwrap();
        // 1500 gpm -> internal cfs -> lps.
        let expect = before.points[0].0 / crate::units::GPM_PER_CFS * crate::units::LPS_PER_CFS;
        assert!(approx_eq(after.points[0].0, expect, 1e-6));
        // Head converts ft -> m.
        let expect_y = before.points[0].1 * crate::units::M_PER_FT;
        assert!(approx_eq(after.points[0].1, expect_y, 1e-6));
    }

    #[rstest]
    fn quality_type_selection(mut ph: EPANET) {
        ph.set_quality_type(QualityType::Trace, "", "", "9").unwrap();
        let info = ph.get_quality_info().unwrap();
        assert_eq!(info.quality_type, QualityType::Trace);
        assert_eq!(info.trace_node_index, ph.get_node_index("9").unwrap());

        let result = ph.set_quality_type(QualityType::Trace, "", "", "nope");
        assert_eq!(result.unwrap_err(), EPANETError::from(212));
    }
}
