//! Export/import round trips against an in-memory database.

mod test_utils;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use portability::seeds::seed_reference_data;
use portability::transfer::archive;
use portability::transfer::exporter::EXPORT_PAGE_SIZE;
use portability::transfer::store::{Cell, TableStore};
use portability::transfer::{
    ExportRequest, Exporter, ImportMode, ImportReport, ImportRequest, Importer,
    PortabilityError, RepositoryGraph,
};
use sea_orm::DatabaseConnection;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use test_utils::*;

const TENANT_TABLES: &[&str] = &[
    "user",
    "role",
    "organization",
    "user_organization",
    "employee",
    "tag",
    "organization_project",
    "task",
    "time_log",
    "invoice",
];

struct Harness {
    db: DatabaseConnection,
    graph: Arc<RepositoryGraph>,
    work: TempDir,
}

impl Harness {
    async fn new() -> Self {
        Self {
            db: setup_test_db().await.unwrap(),
            graph: test_graph(),
            work: TempDir::new().unwrap(),
        }
    }

    fn exporter(&self) -> Exporter {
        Exporter::new(self.db.clone(), Arc::clone(&self.graph), self.work.path().join("jobs"))
    }

    fn importer(&self) -> Importer {
        Importer::new(self.db.clone(), Arc::clone(&self.graph), self.work.path().join("jobs"))
    }

    /// Runs an export and copies the archive out of the job workspace.
    async fn export(&self, request: ExportRequest) -> PathBuf {
        let exporter = self.exporter();
        let (job, _report) = exporter
            .run(&request, CancellationToken::new())
            .await
            .unwrap();
        let target = self.work.path().join(job.archive_file_name());
        let mut file = tokio::fs::File::create(&target).await.unwrap();
        exporter.deliver(job, &mut file).await.unwrap();
        target
    }

    async fn import(&self, archive: &Path, tenant_id: &str, mode: ImportMode) -> ImportReport {
        self.importer()
            .run(
                archive,
                ImportRequest {
                    tenant_id: tenant_id.to_string(),
                    mode,
                    user_id: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap()
    }
}

fn export_all(tenant_id: &str) -> ExportRequest {
    ExportRequest {
        tenant_id: tenant_id.to_string(),
        ..ExportRequest::default()
    }
}

fn list_archive(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).unwrap();
    let archive = zip::ZipArchive::new(file).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

#[tokio::test]
async fn round_trip_into_fresh_tenant_preserves_row_counts() {
    let h = Harness::new().await;
    let source = create_tenant(&h.db, "Source").await.unwrap();
    populate_tenant(&h.db, &source).await.unwrap();
    let destination = create_tenant(&h.db, "Destination").await.unwrap();

    let archive = h.export(export_all(&source)).await;
    let report = h.import(&archive, &destination, ImportMode::Merge).await;

    for table in TENANT_TABLES {
        assert_eq!(
            count_for_tenant(&h.db, table, &destination).await.unwrap(),
            count_for_tenant(&h.db, table, &source).await.unwrap(),
            "row count of {table}"
        );
    }
    assert_eq!(report.total_skipped(), 0);
    assert_eq!(report.table("task").unwrap().imported, 2);
    assert_eq!(report.table("tag").unwrap().reused, 1, "global tag is shared, not copied");

    for (pivot, join, owner) in [
        ("tag_task", "task_id", "task"),
        ("organization_project_employee", "organization_project_id", "organization_project"),
    ] {
        assert_eq!(
            count_pivot(&h.db, pivot, join, owner, &destination).await.unwrap(),
            count_pivot(&h.db, pivot, join, owner, &source).await.unwrap(),
            "pivot {pivot}"
        );
    }
    assert_eq!(report.pivots_inserted, 3);
    assert_eq!(report.pivots_dropped, 0);
}

#[tokio::test]
async fn imported_references_point_into_the_destination_tenant() {
    let h = Harness::new().await;
    let source = create_tenant(&h.db, "Source").await.unwrap();
    let fixture = populate_tenant(&h.db, &source).await.unwrap();
    let destination = create_tenant(&h.db, "Destination").await.unwrap();

    let archive = h.export(export_all(&source)).await;
    h.import(&archive, &destination, ImportMode::Merge).await;

    let organizations = ids_for_tenant(&h.db, "organization", &destination).await.unwrap();
    let users = ids_for_tenant(&h.db, "user", &destination).await.unwrap();
    let employees = ids_for_tenant(&h.db, "employee", &destination).await.unwrap();
    assert_eq!(organizations.len(), 1);
    assert_ne!(organizations[0], fixture.organization_id);

    let employee = &employees[0];
    assert_eq!(
        column_value(&h.db, "employee", "organization_id", employee).await.unwrap(),
        Some(organizations[0].clone())
    );
    assert_eq!(
        column_value(&h.db, "employee", "user_id", employee).await.unwrap(),
        Some(users[0].clone())
    );
    assert_eq!(
        column_value(&h.db, "organization", "created_by_user_id", &organizations[0])
            .await
            .unwrap(),
        Some(users[0].clone())
    );

    // Every imported task keeps its project, and the child keeps its parent.
    let translations = h.importer().translations().clone();
    let parent = translations
        .lookup(&destination, "task", &fixture.parent_task_id)
        .await
        .unwrap()
        .unwrap();
    let child = translations
        .lookup(&destination, "task", &fixture.child_task_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        column_value(&h.db, "task", "parent_id", &child).await.unwrap(),
        Some(parent.clone())
    );
    assert_eq!(column_value(&h.db, "task", "parent_id", &parent).await.unwrap(), None);
    assert_eq!(
        column_value(&h.db, "task", "title", &child).await.unwrap().as_deref(),
        Some("Story, with a comma")
    );

    let tenant_root = translations
        .lookup(&destination, "tenant", &source)
        .await
        .unwrap();
    assert_eq!(tenant_root.as_deref(), Some(destination.as_str()));
}

#[tokio::test]
async fn repeated_merge_does_not_duplicate_reference_rows() {
    let h = Harness::new().await;
    seed_reference_data(&h.db).await.unwrap();
    let source = create_tenant(&h.db, "Source").await.unwrap();
    populate_tenant(&h.db, &source).await.unwrap();
    let destination = create_tenant(&h.db, "Destination").await.unwrap();

    let archive = h.export(export_all(&source)).await;
    let countries = count_all(&h.db, "country").await.unwrap();
    let currencies = count_all(&h.db, "currency").await.unwrap();
    let tags = count_all(&h.db, "tag").await.unwrap();

    h.import(&archive, &destination, ImportMode::Merge).await;
    let second = h.import(&archive, &destination, ImportMode::Merge).await;

    assert_eq!(count_all(&h.db, "country").await.unwrap(), countries);
    assert_eq!(count_all(&h.db, "currency").await.unwrap(), currencies);
    // One tenant tag copied once; global tags reused.
    assert_eq!(count_all(&h.db, "tag").await.unwrap(), tags + 1);
    assert_eq!(count_for_tenant(&h.db, "user", &destination).await.unwrap(), 1);
    assert_eq!(count_for_tenant(&h.db, "role", &destination).await.unwrap(), 1);
    assert_eq!(second.table("country").unwrap().imported, 0);
    assert_eq!(second.table("user").unwrap().reused, 1);
}

#[tokio::test]
async fn clean_import_replaces_tenant_rows_but_keeps_static_ones() {
    let h = Harness::new().await;
    let source = create_tenant(&h.db, "Source").await.unwrap();
    populate_tenant(&h.db, &source).await.unwrap();
    let destination = create_tenant(&h.db, "Destination").await.unwrap();
    let archive = h.export(export_all(&source)).await;

    h.import(&archive, &destination, ImportMode::Merge).await;
    h.import(&archive, &destination, ImportMode::Merge).await;
    assert_eq!(count_for_tenant(&h.db, "organization", &destination).await.unwrap(), 2);
    let users_before = ids_for_tenant(&h.db, "user", &destination).await.unwrap();

    let report = h.import(&archive, &destination, ImportMode::Clean).await;

    assert!(report.cleaned_rows > 0);
    assert_eq!(count_for_tenant(&h.db, "organization", &destination).await.unwrap(), 1);
    assert_eq!(count_for_tenant(&h.db, "task", &destination).await.unwrap(), 2);
    assert_eq!(
        ids_for_tenant(&h.db, "user", &destination).await.unwrap(),
        users_before,
        "static rows survive a clean import"
    );
    // The source tenant is untouched.
    assert_eq!(count_for_tenant(&h.db, "organization", &source).await.unwrap(), 1);
}

#[tokio::test]
async fn empty_tables_produce_no_csv_and_missing_csvs_are_skipped() {
    let h = Harness::new().await;
    let source = create_tenant(&h.db, "Source").await.unwrap();
    populate_tenant(&h.db, &source).await.unwrap();

    let archive = h.export(export_all(&source)).await;
    let entries = list_archive(&archive);
    assert!(entries.contains(&"csv/organization.csv".to_string()));
    assert!(entries.contains(&"csv/tag_task.csv".to_string()));
    assert!(!entries.contains(&"csv/changelog.csv".to_string()));
    assert!(!entries.contains(&"csv/country.csv".to_string()));

    let destination = create_tenant(&h.db, "Destination").await.unwrap();
    let report = h.import(&archive, &destination, ImportMode::Merge).await;
    assert!(report.missing.contains(&"changelog".to_string()));
    assert!(report.missing.contains(&"country".to_string()));
}

#[tokio::test]
async fn filtered_export_contains_only_named_tables_and_their_pivots() {
    let h = Harness::new().await;
    let source = create_tenant(&h.db, "Source").await.unwrap();
    populate_tenant(&h.db, &source).await.unwrap();

    let archive = h
        .export(ExportRequest {
            tenant_id: source.clone(),
            tables: Some(vec!["task".into(), "organization".into()]),
            ..ExportRequest::default()
        })
        .await;

    assert_eq!(
        list_archive(&archive),
        vec!["csv/organization.csv", "csv/tag_task.csv", "csv/task.csv"]
    );

    let err = h
        .exporter()
        .run(
            &ExportRequest {
                tenant_id: source,
                tables: Some(vec!["widget".into()]),
                ..ExportRequest::default()
            },
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PortabilityError::UnknownTable(name) if name == "widget"));
}

#[tokio::test]
async fn template_export_writes_header_only_csvs() {
    let h = Harness::new().await;
    let tenant = create_tenant(&h.db, "Empty").await.unwrap();

    let archive = h
        .export(ExportRequest {
            tenant_id: tenant,
            template: true,
            ..ExportRequest::default()
        })
        .await;

    let extract = TempDir::new().unwrap();
    archive::extract(&archive, extract.path()).unwrap();
    let header = std::fs::read_to_string(archive::locate_csv(extract.path(), "tag").unwrap()).unwrap();
    assert_eq!(header.trim_end(), "id,tenant_id,organization_id,name,color,is_system");
    let pivot = std::fs::read_to_string(archive::locate_csv(extract.path(), "tag_task").unwrap()).unwrap();
    assert_eq!(pivot.trim_end(), "task_id,tag_id");
    assert_eq!(list_archive(&archive).len(), h.graph.len() + 2);
}

fn write_archive(dir: &Path, files: &[(&str, &str)]) -> PathBuf {
    let csv_dir = dir.join("csv");
    std::fs::create_dir_all(&csv_dir).unwrap();
    for (name, content) in files {
        std::fs::write(csv_dir.join(format!("{name}.csv")), content).unwrap();
    }
    let path = dir.join("handmade.zip");
    archive::compress_dir(&csv_dir, &path).unwrap();
    path
}

#[tokio::test]
async fn bad_rows_are_skipped_without_failing_the_job() {
    let h = Harness::new().await;
    let destination = create_tenant(&h.db, "Destination").await.unwrap();
    let dir = TempDir::new().unwrap();
    let archive = write_archive(
        dir.path(),
        &[
            (
                "organization",
                "id,tenant_id,name,currency_code,is_default,created_at,created_by_user_id\n\
                 o-1,src,Acme,USD,true,2025-03-01T09:30:00.000Z,\n\
                 o-2,src,Broken,USD,maybe,2025-03-01T09:30:00.000Z,\n\
                 ,src,No id,USD,true,2025-03-01T09:30:00.000Z,\n",
            ),
            (
                "employee",
                "id,tenant_id,organization_id,user_id,start_date,billable_rate,is_active\n\
                 e-1,src,o-unknown,u-unknown,,,true\n",
            ),
        ],
    );

    let report = h.import(&archive, &destination, ImportMode::Merge).await;

    assert_eq!(report.table("organization").unwrap().imported, 1);
    assert_eq!(report.table("organization").unwrap().skipped, 2);
    assert_eq!(report.table("employee").unwrap().skipped, 1);
    assert_eq!(count_for_tenant(&h.db, "organization", &destination).await.unwrap(), 1);
    assert_eq!(count_for_tenant(&h.db, "employee", &destination).await.unwrap(), 0);
}

#[tokio::test]
async fn unresolvable_nullable_reference_becomes_null() {
    let h = Harness::new().await;
    let destination = create_tenant(&h.db, "Destination").await.unwrap();
    let dir = TempDir::new().unwrap();
    let archive = write_archive(
        dir.path(),
        &[(
            "organization",
            "id,tenant_id,name,currency_code,is_default,created_at,created_by_user_id\n\
             o-1,src,Acme,,false,2025-03-01 09:30:00,u-from-elsewhere\n",
        )],
    );

    h.import(&archive, &destination, ImportMode::Merge).await;

    let organization = &ids_for_tenant(&h.db, "organization", &destination).await.unwrap()[0];
    assert_eq!(
        column_value(&h.db, "organization", "created_by_user_id", organization)
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn pivot_rows_with_foreign_endpoints_are_dropped() {
    let h = Harness::new().await;
    let source = create_tenant(&h.db, "Source").await.unwrap();
    let fixture = populate_tenant(&h.db, &source).await.unwrap();

    // Another tenant's tag attached to one of our tasks.
    let other = create_tenant(&h.db, "Other").await.unwrap();
    let foreign = populate_tenant(&h.db, &other).await.unwrap();
    TableStore::new(h.db.clone())
        .insert_row(
            "tag_task",
            vec![
                (
                    "task_id".into(),
                    Cell::Text(fixture.parent_task_id.clone()),
                ),
                (
                    "tag_id".into(),
                    Cell::Text(foreign.tag_id.clone()),
                ),
            ],
        )
        .await
        .unwrap();

    let destination = create_tenant(&h.db, "Destination").await.unwrap();
    let archive = h.export(export_all(&source)).await;
    let report = h.import(&archive, &destination, ImportMode::Merge).await;

    assert_eq!(report.pivots_dropped, 1);
    assert_eq!(
        count_pivot(&h.db, "tag_task", "task_id", "task", &destination).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn importing_user_is_attached_to_imported_organizations() {
    let h = Harness::new().await;
    let source = create_tenant(&h.db, "Source").await.unwrap();
    populate_tenant(&h.db, &source).await.unwrap();
    let destination = create_tenant(&h.db, "Destination").await.unwrap();
    let operator = insert(
        &h.db,
        "user",
        vec![
            ("tenant_id", Cell::Text(destination.clone())),
            ("email", Cell::Text("ops@example.com".into())),
            ("is_active", Cell::Boolean(true)),
        ],
    )
    .await
    .unwrap();

    let archive = h.export(export_all(&source)).await;
    let request = ImportRequest {
        tenant_id: destination.clone(),
        mode: ImportMode::Merge,
        user_id: Some(operator.clone()),
    };
    let report = h
        .importer()
        .run(&archive, request.clone(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.memberships_added, 1);

    // Re-running does not add a second membership for the same organization.
    let organizations_before = count_for_tenant(&h.db, "organization", &destination).await.unwrap();
    let again = h
        .importer()
        .run(&archive, request, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        count_for_tenant(&h.db, "organization", &destination).await.unwrap(),
        organizations_before + 1
    );
    assert_eq!(again.memberships_added, 1);
    // Copied membership plus one per import for the operator.
    assert_eq!(count_for_tenant(&h.db, "user_organization", &destination).await.unwrap(), 4);
}

#[tokio::test]
async fn cancelled_jobs_fail_and_leave_no_workspace() {
    let h = Harness::new().await;
    let source = create_tenant(&h.db, "Source").await.unwrap();
    populate_tenant(&h.db, &source).await.unwrap();
    let archive = h.export(export_all(&source)).await;

    let token = CancellationToken::new();
    token.cancel();

    let export = h.exporter().run(&export_all(&source), token.clone()).await;
    assert!(export.unwrap_err().is_cancelled());

    let import = h
        .importer()
        .run(
            &archive,
            ImportRequest {
                tenant_id: source,
                mode: ImportMode::Clean,
                user_id: None,
            },
            token,
        )
        .await;
    assert!(import.unwrap_err().is_cancelled());

    let leftovers = std::fs::read_dir(h.work.path().join("jobs")).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn corrupt_archive_fails_the_import() {
    let h = Harness::new().await;
    let tenant = create_tenant(&h.db, "Destination").await.unwrap();
    let bogus = h.work.path().join("bogus.zip");
    std::fs::write(&bogus, b"definitely not a zip").unwrap();

    let err = h
        .importer()
        .run(
            &bogus,
            ImportRequest {
                tenant_id: tenant,
                mode: ImportMode::Merge,
                user_id: None,
            },
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PortabilityError::Archive(_)));
}

const ORGANIZATION_CSV: &str = "id,tenant_id,name,currency_code,is_default,created_at,created_by_user_id\n\
                                o-1,src,Acme,USD,true,2025-03-01T09:30:00.000Z,\n";

// The child is listed first so its parent cannot be resolved on the first pass.
const CHILD_FIRST_TASK_CSV: &str =
    "id,tenant_id,organization_id,project_id,parent_id,title,status,estimate,due_date,created_by_user_id\n\
     aaa-child,src,o-1,,zzz-parent,Story,OPEN,,,\n\
     zzz-parent,src,o-1,,,Epic,OPEN,,,\n";

async fn imported_id(h: &Harness, tenant_id: &str, table: &str, source_id: &str) -> String {
    h.importer()
        .translations()
        .lookup(tenant_id, table, source_id)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("{table} {source_id} was not imported"))
}

#[tokio::test]
async fn parent_listed_after_child_is_patched_in_second_pass() {
    let h = Harness::new().await;
    let destination = create_tenant(&h.db, "Destination").await.unwrap();
    let dir = TempDir::new().unwrap();
    let archive = write_archive(
        dir.path(),
        &[("organization", ORGANIZATION_CSV), ("task", CHILD_FIRST_TASK_CSV)],
    );

    let report = h.import(&archive, &destination, ImportMode::Merge).await;

    assert_eq!(report.table("task").unwrap().imported, 2);
    assert_eq!(report.patches_applied, 1);
    let parent = imported_id(&h, &destination, "task", "zzz-parent").await;
    let child = imported_id(&h, &destination, "task", "aaa-child").await;
    assert_eq!(
        column_value(&h.db, "task", "parent_id", &child).await.unwrap(),
        Some(parent)
    );
}

#[tokio::test]
async fn clean_reimport_does_not_reuse_deleted_parents() {
    let h = Harness::new().await;
    let destination = create_tenant(&h.db, "Destination").await.unwrap();
    let dir = TempDir::new().unwrap();
    let archive = write_archive(
        dir.path(),
        &[("organization", ORGANIZATION_CSV), ("task", CHILD_FIRST_TASK_CSV)],
    );

    h.import(&archive, &destination, ImportMode::Merge).await;
    let first_parent = imported_id(&h, &destination, "task", "zzz-parent").await;

    let report = h.import(&archive, &destination, ImportMode::Clean).await;

    assert_eq!(report.table("task").unwrap().skipped, 0);
    assert_eq!(report.patches_applied, 1);
    let tasks = ids_for_tenant(&h.db, "task", &destination).await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert!(!tasks.contains(&first_parent));

    let parent = imported_id(&h, &destination, "task", "zzz-parent").await;
    let child = imported_id(&h, &destination, "task", "aaa-child").await;
    assert_eq!(
        column_value(&h.db, "task", "parent_id", &child).await.unwrap(),
        Some(parent)
    );
    assert_references_resolve(&h.db, &h.graph).await.unwrap();
}

#[tokio::test]
async fn clean_reimport_of_full_export_keeps_every_reference_valid() {
    let h = Harness::new().await;
    let source = create_tenant(&h.db, "Source").await.unwrap();
    populate_tenant(&h.db, &source).await.unwrap();
    let destination = create_tenant(&h.db, "Destination").await.unwrap();
    let archive = h.export(export_all(&source)).await;

    h.import(&archive, &destination, ImportMode::Merge).await;
    let report = h.import(&archive, &destination, ImportMode::Clean).await;

    assert_eq!(report.total_skipped(), 0);
    assert_eq!(count_for_tenant(&h.db, "task", &destination).await.unwrap(), 2);
    assert_eq!(
        count_pivot(&h.db, "tag_task", "task_id", "task", &destination).await.unwrap(),
        2
    );
    assert_references_resolve(&h.db, &h.graph).await.unwrap();
}

#[tokio::test]
async fn csv_without_tenant_column_lands_in_destination_tenant() {
    let h = Harness::new().await;
    let destination = create_tenant(&h.db, "Destination").await.unwrap();
    let dir = TempDir::new().unwrap();
    let archive = write_archive(
        dir.path(),
        &[(
            "organization",
            "id,name,currency_code,is_default,created_at,created_by_user_id\n\
             o-1,Acme,USD,true,2025-03-01T09:30:00.000Z,\n",
        )],
    );

    let report = h.import(&archive, &destination, ImportMode::Merge).await;

    assert_eq!(report.table("organization").unwrap().imported, 1);
    assert_eq!(count_for_tenant(&h.db, "organization", &destination).await.unwrap(), 1);
}

#[tokio::test]
async fn large_tables_are_exported_across_pages() {
    let h = Harness::new().await;
    let source = create_tenant(&h.db, "Source").await.unwrap();
    let total = EXPORT_PAGE_SIZE as usize * 2 + 7;
    for i in 0..total {
        insert(
            &h.db,
            "role",
            vec![
                ("tenant_id", Cell::Text(source.clone())),
                ("name", Cell::Text(format!("role-{i}"))),
                ("is_system", Cell::Boolean(false)),
            ],
        )
        .await
        .unwrap();
    }

    let archive = h.export(export_all(&source)).await;
    let extract = TempDir::new().unwrap();
    archive::extract(&archive, extract.path()).unwrap();
    let csv = std::fs::read_to_string(archive::locate_csv(extract.path(), "role").unwrap()).unwrap();

    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("id,tenant_id,name,is_system"));
    let ids: std::collections::BTreeSet<&str> = lines
        .map(|line| line.split(',').next().unwrap())
        .collect();
    assert_eq!(ids.len(), total);

    let destination = create_tenant(&h.db, "Destination").await.unwrap();
    let report = h.import(&archive, &destination, ImportMode::Merge).await;
    assert_eq!(report.table("role").unwrap().imported, total as u64);
}
