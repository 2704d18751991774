//! Project-related API methods for EPANET.
//!
//! This module contains methods for getting or altering project information.

use crate::epanet_error::*;
use crate::types::{CountType, ObjectType, MAX_TITLE_SIZE};
use crate::EPANET;
use std::path::Path;

/// ## Project APIs
impl EPANET {
    /// Returns the number of objects of a specified type in the current
    /// EPANET project.
    pub fn get_count(&self, count_type: CountType) -> Result<i32> {
        Ok(self.project.network.count(count_type))
    }

    /// Returns the project title as up to three newline-joined lines.
    pub fn get_title(&self) -> Result<String> {
        Ok(self
            .project
            .title
            .iter()
            .map(|l| l.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    pub fn set_title(
        &mut self,
        title_line1: &str,
        title_line2: &str,
        title_line3: &str,
    ) -> Result<()> {
        for (slot, line) in self
            .project
            .title
            .iter_mut()
            .zip([title_line1, title_line2, title_line3])
        {
            let mut line = line.to_string();
            line.truncate(MAX_TITLE_SIZE);
            *slot = line;
        }
        Ok(())
    }

    /// Gets the descriptive comment attached to an object.
    pub fn get_comment(&self, object_type: ObjectType, index: i32) -> Result<String> {
        let comment = match object_type {
            ObjectType::Node => self.project.network.node(index)?.comment.clone(),
            ObjectType::Link => self.project.network.link(index)?.comment.clone(),
            ObjectType::TimePattern => self.project.network.pattern(index)?.comment.clone(),
            ObjectType::Curve => self.project.network.curve(index)?.comment.clone(),
            _ => return Err(ErrorCode::IllegalParameterCode.into()),
        };
        Ok(comment)
    }

    pub fn set_comment(&mut self, object_type: ObjectType, index: i32, comment: &str) -> Result<()> {
        let slot = match object_type {
            ObjectType::Node => &mut self.project.network.node_mut(index)?.comment,
            ObjectType::Link => &mut self.project.network.link_mut(index)?.comment,
            ObjectType::TimePattern => &mut self.project.network.pattern_mut(index)?.comment,
            ObjectType::Curve => &mut self.project.network.curve_mut(index)?.comment,
            _ => return Err(ErrorCode::IllegalParameterCode.into()),
        };
        *slot = comment.to_string();
        Ok(())
    }

    /// Runs a complete simulation (hydraulics, quality, report), invoking the
    /// progress callback before each phase. The callback must not reenter
    /// the engine.
    pub fn run_project(
        &mut self,
        mut callback: Option<&mut dyn FnMut(&str)>,
    ) -> Result<()> {
        if let Some(cb) = callback.as_deref_mut() {
            cb("Solving hydraulics");
        }
        self.solve_h()?;
        if let Some(cb) = callback.as_deref_mut() {
            cb("Solving water quality");
        }
        self.solve_q()?;
        if let Some(cb) = callback.as_deref_mut() {
            cb("Writing report");
        }
        self.report()?;
        self.close()
    }

    /// Saves the current network to an EPANET-formatted input file.
    pub fn save_inp_file(&mut self, file_name: &str) -> Result<()> {
        check_error_with_context(
            self.project.write_inp(Path::new(file_name)),
            format!("Failed to save project to {file_name}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::test_utils::fixtures::*;
    use rstest::rstest;

    #[rstest]
    fn counts_reflect_network(ph: EPANET) {
        assert_eq!(ph.get_count(CountType::NodeCount).unwrap(), 11);
        assert_eq!(ph.get_count(CountType::TankCount).unwrap(), 2);
        assert_eq!(ph.get_count(CountType::LinkCount).unwrap(), 13);
        assert_eq!(ph.get_count(CountType::PatternCount).unwrap(), 1);
        assert_eq!(ph.get_count(CountType::CurveCount).unwrap(), 1);
        assert_eq!(ph.get_count(CountType::ControlCount).unwrap(), 2);
    }

    #[rstest]
    fn titles_round_trip(mut ph: EPANET) {
        ph.set_title("line one", "line two", "").unwrap();
        assert_eq!(ph.get_title().unwrap(), "line one\nline two\n");
    }

    #[rstest]
    fn comments_round_trip(mut ph: EPANET) {
        let index = ph.get_node_index("11").unwrap();
        ph.set_comment(ObjectType::Node, index, "demand hub").unwrap();
        assert_eq!(
            ph.get_comment(ObjectType::Node, index).unwrap(),
            "demand hub"
        );
    }

    #[rstest]
    fn save_and_reopen_round_trips(ph: EPANET) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net1_copy.inp");
        let mut ph = ph;
        ph.save_inp_file(path.to_str().unwrap()).unwrap();

        let reopened = EPANET::with_inp_file(path.to_str().unwrap(), "", "").unwrap();
        assert_eq!(
            reopened.get_count(CountType::NodeCount).unwrap(),
            ph.get_count(CountType::NodeCount).unwrap()
        );
        assert_eq!(
            reopened.get_count(CountType::LinkCount).unwrap(),
            ph.get_count(CountType::LinkCount).unwrap()
        );
        // Element order and IDs survive the round trip.
        for i in 1..=ph.get_count(CountType::NodeCount).unwrap() {
            assert_eq!(reopened.get_node_id(i).unwrap(), ph.get_node_id(i).unwrap());
        }
    }
}
