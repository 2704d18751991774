//! Time Pattern-related API methods for EPANET.

use crate::epanet_error::*;
use crate::EPANET;
use std::path::Path;

/// ## Pattern APIs
impl EPANET {
    /// Adds a new time pattern with a single 1.0 multiplier.
    pub fn add_pattern(&mut self, id: &str) -> Result<()> {
        check_error_with_context(
            self.project.network.add_pattern(id).map(|_| ()),
            format!("Failed to add pattern {id}"),
        )
    }

    /// Deletes a pattern, zeroing references and shifting higher indices.
    pub fn delete_pattern(&mut self, index: i32) -> Result<()> {
        let result = self.project.network.delete_pattern(index).map(|_| {
            let fix = |p: &mut i32| {
                if *p == index {
                    *p = 0;
                } else if *p > index {
                    *p -= 1;
                }
            };
            fix(&mut self.project.hyd.def_pat);
            fix(&mut self.project.hyd.epat);
        });
        check_error_with_context(result, format!("Failed to delete pattern {index}"))
    }

    pub fn get_pattern_index(&self, id: &str) -> Result<i32> {
        match self.project.network.find_pattern(id) {
            0 => Err(ErrorCode::UndefinedPattern.into()),
            index => Ok(index),
        }
    }

    pub fn get_pattern_id(&self, index: i32) -> Result<String> {
        Ok(self.project.network.pattern(index)?.id.clone())
    }

    pub fn set_pattern_id(&mut self, index: i32, id: &str) -> Result<()> {
        self.project.network.pattern(index)?;
        if !crate::types::valid_id(id) {
            return Err(ErrorCode::IllegalId.into());
        }
        let existing = self.project.network.find_pattern(id);
        if existing != 0 && existing != index {
            return Err(ErrorCode::DuplicateId.into());
        }
        self.project.network.patterns[index as usize].id = id.to_string();
        Ok(())
    }

    pub fn get_pattern_length(&self, index: i32) -> Result<i32> {
        Ok(self.project.network.pattern(index)?.factors.len() as i32)
    }

    /// The multiplier for a 1-based period, cycling past the pattern length.
    pub fn get_pattern_value(&self, index: i32, period: i32) -> Result<f64> {
        let pattern = self.project.network.pattern(index)?;
        if period < 1 {
            return Err(ErrorCode::IllegalParameterCode.into());
        }
        Ok(pattern.value(period as usize - 1))
    }

    pub fn set_pattern_value(&mut self, index: i32, period: i32, value: f64) -> Result<()> {
        let pattern = self.project.network.pattern_mut(index)?;
        if period < 1 || period as usize > pattern.factors.len() {
            return Err(ErrorCode::IllegalParameterCode.into());
        }
        pattern.factors[period as usize - 1] = value;
        Ok(())
    }

    pub fn get_average_pattern_value(&self, index: i32) -> Result<f64> {
        let pattern = self.project.network.pattern(index)?;
        if pattern.factors.is_empty() {
            return Ok(1.0);
        }
        Ok(pattern.factors.iter().sum::<f64>() / pattern.factors.len() as f64)
    }

    /// Replaces all of a pattern's multipliers.
    pub fn set_pattern(&mut self, index: i32, values: &[f64]) -> Result<()> {
        if values.is_empty() {
            return Err(ErrorCode::IllegalNumericValue.into());
        }
        self.project.network.pattern_mut(index)?.factors = values.to_vec();
        Ok(())
    }

    /// Loads a pattern from a text file of whitespace-separated multipliers.
    pub fn load_pattern_file(&mut self, file_name: &Path, id: &str) -> Result<()> {
        let text = std::fs::read_to_string(file_name)
            .map_err(|_| EPANETError::from(ErrorCode::CannotOpenInputFile))?;
        let values: std::result::Result<Vec<f64>, _> = text
            .split_whitespace()
            .map(|tok| tok.parse::<f64>())
            .collect();
        let values = values.map_err(|_| EPANETError::from(ErrorCode::IllegalNumericValue))?;
        self.add_pattern(id)?;
        let index = self.get_pattern_index(id)?;
        self.set_pattern(index, &values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::test_utils::fixtures::*;
    use rstest::rstest;

    #[rstest]
    fn pattern_periods_cycle(mut ph_close: EPANET) {
        ph_close.add_pattern("P1").unwrap();
        let index = ph_close.get_pattern_index("P1").unwrap();
        ph_close.set_pattern(index, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(ph_close.get_pattern_length(index).unwrap(), 3);
        assert_eq!(ph_close.get_pattern_value(index, 2).unwrap(), 2.0);
        // Period beyond the length wraps modulo the length.
        assert_eq!(ph_close.get_pattern_value(index, 5).unwrap(), 2.0);
        assert!(approx_eq(
            ph_close.get_average_pattern_value(index).unwrap(),
            2.0,
            1e-12
        ));
    }

    #[rstest]
    fn deleting_pattern_rewrites_references(mut ph_close: EPANET) {
        ph_close.add_pattern("A").unwrap();
        ph_close.add_pattern("B").unwrap();
        ph_close
            .add_node("J1", crate::types::NodeType::Junction)
            .unwrap();
        let b = ph_close.get_pattern_index("B").unwrap();
        ph_close
            .set_node_value(1, crate::types::NodeProperty::Pattern, b as f64)
            .unwrap();

        ph_close.delete_pattern(1).unwrap();
        // B shifted down to index 1 and the junction followed it.
        assert_eq!(ph_close.get_pattern_index("B").unwrap(), 1);
        assert_eq!(
            ph_close
                .get_node_value(1, crate::types::NodeProperty::Pattern)
                .unwrap(),
            1.0
        );
    }
}
