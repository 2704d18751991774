//! Data Curve-related API methods for EPANET.

use crate::epanet_error::*;
use crate::types::curve::{Curve, CurveType};
use crate::EPANET;

/// ## Curve APIs
impl EPANET {
    /// Creates a curve with the given type and points; x-values must be
    /// strictly increasing.
    pub fn create_curve(
        &mut self,
        id: &str,
        curve_type: CurveType,
        points: &[(f64, f64)],
    ) -> Result<Curve> {
        let index = check_error_with_context(
            self.project.network.add_curve(id),
            format!("Failed to add curve {id}"),
        )?;
        let curve = &mut self.project.network.curves[index as usize];
        curve.ctype = curve_type;
        curve.x = points.iter().map(|(x, _)| *x).collect();
        curve.y = points.iter().map(|(_, y)| *y).collect();
        if !curve.is_valid() {
            // Leave the project untouched on a bad point set.
            self.project.network.delete_curve(index)?;
            return Err(ErrorCode::CurveNotIncreasing.into());
        }
        Ok(Curve {
            index,
            id: id.to_string(),
            curve_type,
            points: points.to_vec(),
        })
    }

    pub fn get_curve_by_id(&self, id: &str) -> Result<Curve> {
        match self.project.network.find_curve(id) {
            0 => Err(ErrorCode::UndefinedCurve.into()),
            index => self.get_curve_by_index(index),
        }
    }

    pub fn get_curve_by_index(&self, index: i32) -> Result<Curve> {
        let curve = self.project.network.curve(index)?;
        Ok(Curve {
            index,
            id: curve.id.clone(),
            curve_type: curve.ctype,
            points: curve.x.iter().copied().zip(curve.y.iter().copied()).collect(),
        })
    }

    /// Writes back an edited curve snapshot.
    pub fn update_curve(&mut self, curve: &Curve) -> Result<()> {
        {
            let data = self.project.network.curve(curve.index)?;
            let mut probe = data.clone();
            probe.x = curve.points.iter().map(|(x, _)| *x).collect();
            probe.y = curve.points.iter().map(|(_, y)| *y).collect();
            if !probe.is_valid() {
                return Err(ErrorCode::CurveNotIncreasing.into());
            }
        }
        let data = self.project.network.curve_mut(curve.index)?;
        data.ctype = curve.curve_type;
        data.x = curve.points.iter().map(|(x, _)| *x).collect();
        data.y = curve.points.iter().map(|(_, y)| *y).collect();
        if data.id != curve.id {
            let id = curve.id.clone();
            let existing = self.project.network.find_curve(&id);
            if existing != 0 && existing != curve.index {
                return Err(ErrorCode::DuplicateId.into());
            }
            self.project.network.curves[curve.index as usize].id = id;
        }
        Ok(())
    }

    /// Deletes a curve, zeroing tank and pump references to it.
    pub fn delete_curve(&mut self, curve: Curve) -> Result<()> {
        Ok(self.project.network.delete_curve(curve.index)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::test_utils::fixtures::*;
    use rstest::*;

    #[rstest]
    fn curve_crud(mut ph_close: EPANET) {
        let curve = ph_close
            .create_curve("C1", CurveType::PumpCurve, &[(0.0, 100.0), (10.0, 50.0)])
            .unwrap();
        assert_eq!(curve.index(), 1);

        let mut fetched = ph_close.get_curve_by_id("C1").unwrap();
        assert_eq!(fetched.points.len(), 2);
        fetched.points[1] = (12.0, 40.0);
        ph_close.update_curve(&fetched).unwrap();
        assert_eq!(
            ph_close.get_curve_by_index(1).unwrap().points[1],
            (12.0, 40.0)
        );

        ph_close.delete_curve(fetched).unwrap();
        assert!(ph_close.get_curve_by_id("C1").is_err());
    }

    #[rstest]
    fn nonincreasing_points_rejected(mut ph_close: EPANET) {
        let result = ph_close.create_curve(
            "C1",
            CurveType::GenericCurve,
            &[(0.0, 0.0), (0.0, 1.0)],
        );
        assert_eq!(result.unwrap_err(), EPANETError::from(230));
        // The rejected curve never entered the project.
        assert_eq!(
            ph_close
                .get_count(crate::types::CountType::CurveCount)
                .unwrap(),
            0
        );
    }

    #[rstest]
    fn net1_pump_curve_present(ph: EPANET) {
        let curve = ph.get_curve_by_id("1").unwrap();
        assert_eq!(curve.curve_type, CurveType::PumpCurve);
        assert_eq!(curve.points, vec![(1500.0, 250.0)]);
    }
}
