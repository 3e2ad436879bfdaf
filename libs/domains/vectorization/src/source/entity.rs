use chrono::{Datelike, NaiveDate};
use sea_orm::entity::prelude::*;

use crate::models::PatientRecord;

/// Sea-ORM entity for the `patients` table. Only ever read.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "patients")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub patient_id: i64,
    pub full_name: String,
    pub identification_number: Option<String>,
    pub birth_date: Option<Date>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub gender: Option<String>,
    pub blood_type: Option<String>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Whole years between `birth_date` and `today`
pub fn age_on(birth_date: NaiveDate, today: NaiveDate) -> Option<u32> {
    let mut years = today.year() - birth_date.year();
    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}

impl Model {
    pub fn into_record(self, today: NaiveDate) -> PatientRecord {
        PatientRecord {
            id: self.patient_id,
            name: self.full_name,
            identification: self.identification_number,
            age: self.birth_date.and_then(|b| age_on(b, today)),
            birth_date: self.birth_date,
            phone: self.phone,
            email: self.email,
            gender: self.gender,
            blood_type: self.blood_type,
            created_at: self.created_at.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_age_before_and_after_birthday() {
        let birth = date(1990, 6, 15);
        assert_eq!(age_on(birth, date(2024, 6, 14)), Some(33));
        assert_eq!(age_on(birth, date(2024, 6, 15)), Some(34));
        assert_eq!(age_on(birth, date(2024, 12, 1)), Some(34));
    }

    #[test]
    fn test_future_birth_date_has_no_age() {
        assert_eq!(age_on(date(2030, 1, 1), date(2024, 1, 1)), None);
    }
}
