//! Time parameter-related API methods for EPANET.

use crate::epanet_error::*;
use crate::types::analysis::{Event, TimeParameter, TimestepEvent};
use crate::types::options::StatisticType;
use crate::EPANET;
use num_traits::FromPrimitive;

/// ## Time Parameter APIs
impl EPANET {
    pub fn get_time_parameter(&self, parameter: TimeParameter) -> Result<i64> {
        let times = &self.project.times;
        let value = match parameter {
            TimeParameter::Duration => times.duration as i64,
            TimeParameter::HydStep => times.hstep as i64,
            TimeParameter::QualStep => times.qstep as i64,
            TimeParameter::PatternStep => times.pstep as i64,
            TimeParameter::PatternStart => times.pstart as i64,
            TimeParameter::ReportStep => times.rstep as i64,
            TimeParameter::ReportStart => times.rstart as i64,
            TimeParameter::RuleStep => times.rulestep as i64,
            TimeParameter::Statistic => times.statistic as i32 as i64,
            TimeParameter::Periods => times.nperiods as i64,
            TimeParameter::StartTime => times.tstart as i64,
            TimeParameter::HTime => times.htime as i64,
            TimeParameter::QTime => times.qtime as i64,
            TimeParameter::HaltFlag => times.halted as i64,
            TimeParameter::NextEvent => self.next_tank_event().0 as i64,
            TimeParameter::NextEventTank => self.next_tank_event().1 as i64,
        };
        Ok(value)
    }

    pub fn set_time_parameter(&mut self, parameter: TimeParameter, value: i64) -> Result<()> {
        if value < 0 {
            return Err(EPANETError::from(ErrorCode::IllegalNumericValue)
                .with_context(format!("{parameter:?} = {value}")));
        }
        let v = value as u64;
        let times = &mut self.project.times;
        match parameter {
            TimeParameter::Duration => times.duration = v,
            TimeParameter::HydStep => {
                if v == 0 {
                    return Err(ErrorCode::IllegalNumericValue.into());
                }
                times.hstep = v;
            }
            TimeParameter::QualStep => times.qstep = v,
            TimeParameter::PatternStep => {
                if v == 0 {
                    return Err(ErrorCode::IllegalNumericValue.into());
                }
                times.pstep = v;
            }
            TimeParameter::PatternStart => times.pstart = v,
            TimeParameter::ReportStep => {
                if v == 0 {
                    return Err(ErrorCode::IllegalNumericValue.into());
                }
                times.rstep = v;
            }
            TimeParameter::ReportStart => times.rstart = v,
            TimeParameter::RuleStep => times.rulestep = v,
            TimeParameter::Statistic => {
                times.statistic = StatisticType::from_i64(value)
                    .ok_or(EPANETError::from(ErrorCode::IllegalParameterCode))?;
            }
            TimeParameter::StartTime => times.tstart = v % 86400,
            _ => return Err(ErrorCode::IllegalParameterCode.into()),
        }
        Ok(())
    }

    /// The shortest time until any tank becomes empty or full, with the tank
    /// responsible for it.
    pub fn time_to_next_event(&self) -> Result<Event> {
        let (duration, tank) = self.next_tank_event();
        Ok(Event {
            event_type: if tank > 0 {
                TimestepEvent::StepTankEvent
            } else {
                TimestepEvent::StepHyd
            },
            duration,
            element_index: tank,
        })
    }

    fn next_tank_event(&self) -> (u64, i32) {
        let pr = &self.project;
        if !pr.hyd.initialized {
            return (pr.times.hstep, 0);
        }
        let mut best = pr.times.hstep;
        let mut best_tank = 0;
        for tk in 1..=pr.network.n_tanks() {
            let single = pr.tank_timestep_for(tk, pr.times.hstep);
            if let Some(dt) = single {
                if dt < best {
                    best = dt;
                    best_tank = pr.network.tanks[tk].node;
                }
            }
        }
        (best, best_tank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::test_utils::fixtures::*;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[rstest]
    fn every_parameter_reads_back(ph: EPANET) {
        for parameter in TimeParameter::iter() {
            assert!(
                ph.get_time_parameter(parameter).is_ok(),
                "parameter {parameter:?}"
            );
        }
    }

    #[rstest]
    fn net1_times(ph: EPANET) {
        assert_eq!(
            ph.get_time_parameter(TimeParameter::Duration).unwrap(),
            24 * 3600
        );
        assert_eq!(ph.get_time_parameter(TimeParameter::HydStep).unwrap(), 3600);
        assert_eq!(
            ph.get_time_parameter(TimeParameter::PatternStep).unwrap(),
            2 * 3600
        );
    }

    #[rstest]
    fn read_only_parameters_rejected(mut ph: EPANET) {
        let result = ph.set_time_parameter(TimeParameter::Periods, 4);
        assert_eq!(result.unwrap_err(), EPANETError::from(251));
        let result = ph.set_time_parameter(TimeParameter::Duration, -5);
        assert_eq!(result.unwrap_err(), EPANETError::from(202));
    }
}
