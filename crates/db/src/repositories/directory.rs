use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;

use tripgate_core::approvals::OrgDirectory;
use tripgate_core::domain::approver::{ApprovalDelegation, Approver, ApproverId, DelegationId};
use tripgate_core::domain::traveler::{
    Country, CountryId, Department, DepartmentId, Person, PersonId, Traveler, TravelerId,
};

use super::{
    column, date_to_sql, parse_choice, parse_date, parse_level, parse_timestamp,
    timestamp_to_sql, DirectoryRepository, RepositoryError,
};
use crate::DbPool;

#[derive(Clone)]
pub struct SqlDirectoryRepository {
    pool: DbPool,
}

impl SqlDirectoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Creates the account and its default traveler profile together.
    pub async fn register_account(&self, person: &Person) -> Result<Traveler, RepositoryError> {
        let traveler = Traveler::for_new_account(person);
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO person (id, display_name, email) VALUES (?, ?, ?)")
            .bind(&person.id.0)
            .bind(&person.display_name)
            .bind(&person.email)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO traveler (id, person_id, first_name, last_name, kind)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&traveler.id.0)
        .bind(&traveler.person.0)
        .bind(&traveler.first_name)
        .bind(&traveler.last_name)
        .bind(traveler.kind.label())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(traveler)
    }
}

fn row_to_person(row: &SqliteRow) -> Result<Person, RepositoryError> {
    Ok(Person {
        id: PersonId(column(row, "id")?),
        display_name: column(row, "display_name")?,
        email: column(row, "email")?,
    })
}

fn row_to_approver(row: &SqliteRow) -> Result<Approver, RepositoryError> {
    Ok(Approver {
        id: ApproverId(column(row, "id")?),
        person: PersonId(column(row, "person_id")?),
        security_level: parse_level(column(row, "security_level")?)?,
        active: column(row, "active")?,
    })
}

fn row_to_department(row: &SqliteRow) -> Result<Department, RepositoryError> {
    let level1: Option<String> = column(row, "level1_approver_id")?;
    let level2: Option<String> = column(row, "level2_approver_id")?;
    Ok(Department {
        id: DepartmentId(column(row, "id")?),
        name: column(row, "name")?,
        level1_approver: level1.map(ApproverId),
        level2_approver: level2.map(ApproverId),
    })
}

fn row_to_country(row: &SqliteRow) -> Result<Country, RepositoryError> {
    let level3: Option<String> = column(row, "level3_approver_id")?;
    Ok(Country {
        id: CountryId(column(row, "id")?),
        name: column(row, "name")?,
        security_level: parse_level(column(row, "security_level")?)?,
        level3_approver: level3.map(ApproverId),
    })
}

fn row_to_traveler(row: &SqliteRow) -> Result<Traveler, RepositoryError> {
    let kind: String = column(row, "kind")?;
    let department: Option<String> = column(row, "department_id")?;
    let country: Option<String> = column(row, "country_id")?;
    let approver: Option<String> = column(row, "approver_id")?;
    let line_manager: Option<String> = column(row, "line_manager_id")?;
    let dependant_of: Option<String> = column(row, "dependant_of_id")?;

    Ok(Traveler {
        id: TravelerId(column(row, "id")?),
        person: PersonId(column(row, "person_id")?),
        first_name: column(row, "first_name")?,
        last_name: column(row, "last_name")?,
        kind: parse_choice(&kind)?,
        department: department.map(DepartmentId),
        country: country.map(CountryId),
        approver: approver.map(ApproverId),
        line_manager: line_manager.map(TravelerId),
        dependant_of: dependant_of.map(TravelerId),
    })
}

fn row_to_delegation(row: &SqliteRow) -> Result<ApprovalDelegation, RepositoryError> {
    let start_date: String = column(row, "start_date")?;
    let end_date: String = column(row, "end_date")?;
    let created_at: String = column(row, "created_at")?;

    Ok(ApprovalDelegation {
        id: DelegationId(column(row, "id")?),
        delegator: ApproverId(column(row, "delegator_id")?),
        delegate: ApproverId(column(row, "delegate_id")?),
        start_date: parse_date(&start_date)?,
        end_date: parse_date(&end_date)?,
        active: column(row, "active")?,
        reason: column(row, "reason")?,
        revocation_reason: column(row, "revocation_reason")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[async_trait]
impl DirectoryRepository for SqlDirectoryRepository {
    async fn save_person(&self, person: &Person) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO person (id, display_name, email) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 email = excluded.email",
        )
        .bind(&person.id.0)
        .bind(&person.display_name)
        .bind(&person.email)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_approver(&self, approver: &Approver) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO approver (id, person_id, security_level, active) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 person_id = excluded.person_id,
                 security_level = excluded.security_level,
                 active = excluded.active",
        )
        .bind(&approver.id.0)
        .bind(&approver.person.0)
        .bind(i64::from(approver.security_level.as_u8()))
        .bind(approver.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_department(&self, department: &Department) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO department (id, name, level1_approver_id, level2_approver_id)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 level1_approver_id = excluded.level1_approver_id,
                 level2_approver_id = excluded.level2_approver_id",
        )
        .bind(&department.id.0)
        .bind(&department.name)
        .bind(department.level1_approver.as_ref().map(|id| id.0.as_str()))
        .bind(department.level2_approver.as_ref().map(|id| id.0.as_str()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_country(&self, country: &Country) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO country (id, name, security_level, level3_approver_id)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 security_level = excluded.security_level,
                 level3_approver_id = excluded.level3_approver_id",
        )
        .bind(&country.id.0)
        .bind(&country.name)
        .bind(i64::from(country.security_level.as_u8()))
        .bind(country.level3_approver.as_ref().map(|id| id.0.as_str()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_traveler(&self, traveler: &Traveler) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO traveler (id, person_id, first_name, last_name, kind, department_id,
                                   country_id, approver_id, line_manager_id, dependant_of_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 person_id = excluded.person_id,
                 first_name = excluded.first_name,
                 last_name = excluded.last_name,
                 kind = excluded.kind,
                 department_id = excluded.department_id,
                 country_id = excluded.country_id,
                 approver_id = excluded.approver_id,
                 line_manager_id = excluded.line_manager_id,
                 dependant_of_id = excluded.dependant_of_id",
        )
        .bind(&traveler.id.0)
        .bind(&traveler.person.0)
        .bind(&traveler.first_name)
        .bind(&traveler.last_name)
        .bind(traveler.kind.label())
        .bind(traveler.department.as_ref().map(|id| id.0.as_str()))
        .bind(traveler.country.as_ref().map(|id| id.0.as_str()))
        .bind(traveler.approver.as_ref().map(|id| id.0.as_str()))
        .bind(traveler.line_manager.as_ref().map(|id| id.0.as_str()))
        .bind(traveler.dependant_of.as_ref().map(|id| id.0.as_str()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_delegation(
        &self,
        delegation: &ApprovalDelegation,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO approval_delegation (id, delegator_id, delegate_id, start_date, end_date,
                                              active, reason, revocation_reason, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&delegation.id.0)
        .bind(&delegation.delegator.0)
        .bind(&delegation.delegate.0)
        .bind(date_to_sql(&delegation.start_date))
        .bind(date_to_sql(&delegation.end_date))
        .bind(delegation.active)
        .bind(&delegation.reason)
        .bind(&delegation.revocation_reason)
        .bind(timestamp_to_sql(&delegation.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_delegation(
        &self,
        delegation: &ApprovalDelegation,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE approval_delegation
             SET delegate_id = ?, start_date = ?, end_date = ?, active = ?, reason = ?,
                 revocation_reason = ?
             WHERE id = ?",
        )
        .bind(&delegation.delegate.0)
        .bind(date_to_sql(&delegation.start_date))
        .bind(date_to_sql(&delegation.end_date))
        .bind(delegation.active)
        .bind(&delegation.reason)
        .bind(&delegation.revocation_reason)
        .bind(&delegation.id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn load_directory(&self) -> Result<OrgDirectory, RepositoryError> {
        let mut directory = OrgDirectory::default();

        for row in sqlx::query("SELECT id, display_name, email FROM person")
            .fetch_all(&self.pool)
            .await?
        {
            directory.insert_person(row_to_person(&row)?);
        }

        for row in sqlx::query("SELECT id, person_id, security_level, active FROM approver")
            .fetch_all(&self.pool)
            .await?
        {
            directory.insert_approver(row_to_approver(&row)?);
        }

        for row in
            sqlx::query("SELECT id, name, level1_approver_id, level2_approver_id FROM department")
                .fetch_all(&self.pool)
                .await?
        {
            directory.insert_department(row_to_department(&row)?);
        }

        for row in sqlx::query("SELECT id, name, security_level, level3_approver_id FROM country")
            .fetch_all(&self.pool)
            .await?
        {
            directory.insert_country(row_to_country(&row)?);
        }

        for row in sqlx::query(
            "SELECT id, person_id, first_name, last_name, kind, department_id, country_id,
                    approver_id, line_manager_id, dependant_of_id
             FROM traveler",
        )
        .fetch_all(&self.pool)
        .await?
        {
            directory.insert_traveler(row_to_traveler(&row)?);
        }

        for row in sqlx::query(
            "SELECT id, delegator_id, delegate_id, start_date, end_date, active, reason,
                    revocation_reason, created_at
             FROM approval_delegation",
        )
        .fetch_all(&self.pool)
        .await?
        {
            directory.insert_delegation(row_to_delegation(&row)?);
        }

        Ok(directory)
    }
}
