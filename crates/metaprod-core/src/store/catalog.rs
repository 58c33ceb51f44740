//! Reference catalog: proteins and proteomes shared by all projects

use super::Store;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rows per INSERT statement when bulk loading
const INSERT_CHUNK: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReferenceProtein {
    pub accession: String,
    /// Proteome id, `"0"` for contaminants
    pub proteome: String,
    /// Sequence length in residues
    pub length: i64,
    pub description: String,
    pub organism: String,
    pub gene: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Proteome {
    pub id: String,
    pub organism: String,
    pub taxonomy_id: Option<i64>,
}

impl Store {
    /// Insert or update reference proteins. Returns the number written.
    pub async fn upsert_reference_proteins(&self, proteins: &[ReferenceProtein]) -> Result<u64> {
        let mut written = 0;
        let mut tx = self.pool().begin().await?;

        for chunk in proteins.chunks(INSERT_CHUNK) {
            let mut builder = sqlx::QueryBuilder::new(
                "INSERT INTO reference_proteins (accession, proteome, length, description, organism, gene) ",
            );
            builder.push_values(chunk, |mut row, protein| {
                row.push_bind(&protein.accession)
                    .push_bind(&protein.proteome)
                    .push_bind(protein.length)
                    .push_bind(&protein.description)
                    .push_bind(&protein.organism)
                    .push_bind(&protein.gene);
            });
            builder.push(
                r#"
                ON CONFLICT(accession) DO UPDATE SET
                    proteome = excluded.proteome,
                    length = excluded.length,
                    description = excluded.description,
                    organism = excluded.organism,
                    gene = excluded.gene
                "#,
            );
            written += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    pub async fn upsert_proteomes(&self, proteomes: &[Proteome]) -> Result<u64> {
        let mut written = 0;
        let mut tx = self.pool().begin().await?;

        for proteome in proteomes {
            written += sqlx::query(
                r#"
                INSERT INTO proteomes (id, organism, taxonomy_id) VALUES (?1, ?2, ?3)
                ON CONFLICT(id) DO UPDATE SET
                    organism = excluded.organism,
                    taxonomy_id = excluded.taxonomy_id
                "#,
            )
            .bind(&proteome.id)
            .bind(&proteome.organism)
            .bind(proteome.taxonomy_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    pub async fn catalog_size(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reference_proteins")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    /// Catalog entries for the given accessions; unknown accessions are
    /// simply absent from the map.
    pub async fn reference_proteins(
        &self,
        accessions: &[String],
    ) -> Result<HashMap<String, ReferenceProtein>> {
        let mut found = HashMap::with_capacity(accessions.len());

        for chunk in accessions.chunks(INSERT_CHUNK) {
            let mut builder = sqlx::QueryBuilder::new(
                "SELECT accession, proteome, length, description, organism, gene \
                 FROM reference_proteins WHERE accession IN (",
            );
            let mut separated = builder.separated(", ");
            for accession in chunk {
                separated.push_bind(accession);
            }
            separated.push_unseparated(")");

            let rows = builder
                .build_query_as::<ReferenceProtein>()
                .fetch_all(self.pool())
                .await?;
            found.extend(rows.into_iter().map(|p| (p.accession.clone(), p)));
        }

        Ok(found)
    }

    pub async fn get_proteome(&self, id: &str) -> Result<Option<Proteome>> {
        let proteome = sqlx::query_as::<_, Proteome>(
            "SELECT id, organism, taxonomy_id FROM proteomes WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(proteome)
    }
}
