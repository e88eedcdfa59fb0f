// ==========================================
// 导入管道集成测试
// ==========================================
// 使用内存 Mock 仓储 + Mock 配置驱动 CrmImporterImpl 的完整流程
// ==========================================

mod test_helpers;

use crm_import::domain::{
    FieldErrorKind, FieldValue, ImportTarget, MappingOverride, NormalizedRecord,
};
use chrono::NaiveDate;
use crm_import::domain::types::MEDIA_TYPE_XLSX;
use crm_import::importer::{CrmImporter, CrmImporterImpl, ImportError, UploadedFile};
use test_helpers::{csv_upload, MockConfig, MockRecordRepository, CUSTOMERS_CSV};

fn existing_customer(phone: &str, name: &str) -> NormalizedRecord {
    let mut record = NormalizedRecord::new(ImportTarget::Customers, 0);
    record.insert("name", FieldValue::Text(name.to_string()));
    record.insert("phone", FieldValue::Text(phone.to_string()));
    record
}

async fn importer_with_existing() -> CrmImporterImpl<MockRecordRepository, MockConfig> {
    let repo = MockRecordRepository::new();
    repo.seed(existing_customer("0900000000", "李四旧"));
    CrmImporterImpl::new(repo, MockConfig::default())
        .await
        .expect("创建导入器失败")
}

// ==========================================
// 预览
// ==========================================

#[tokio::test]
async fn test_preview_classifies_in_file_and_existing_duplicates() {
    let importer = importer_with_existing().await;

    let preview = importer
        .preview(csv_upload("customers.csv", CUSTOMERS_CSV), ImportTarget::Customers)
        .await
        .unwrap();

    assert_eq!(preview.total_rows, 3);
    assert_eq!(preview.valid_rows, 1);
    assert_eq!(preview.duplicate_rows, 2);
    assert_eq!(preview.invalid_rows, 0);
    assert!(preview.errors.is_empty());
    assert!(preview.unmapped_required.is_empty());
    assert_eq!(
        preview.total_rows,
        preview.valid_rows + preview.duplicate_rows + preview.invalid_rows
    );
    assert_eq!(preview.detected_columns, vec!["姓名", "电话", "邮箱"]);

    let phone_mapping = preview
        .suggested_mappings
        .iter()
        .find(|m| m.target_field == "phone")
        .unwrap();
    assert_eq!(phone_mapping.source_field, "电话");
    assert!(phone_mapping.required);
}

#[tokio::test]
async fn test_missing_required_field_reports_single_error() {
    let importer = importer_with_existing().await;

    let preview = importer
        .preview(
            csv_upload("customers.csv", "姓名,电话\n,0933444555\n"),
            ImportTarget::Customers,
        )
        .await
        .unwrap();

    assert_eq!(preview.invalid_rows, 1);
    assert_eq!(preview.errors.len(), 1);
    let error = &preview.errors[0];
    assert_eq!(error.row, 1);
    assert_eq!(error.field, "name");
    assert_eq!(error.kind, FieldErrorKind::MissingRequiredField);
}

#[tokio::test]
async fn test_all_field_errors_of_a_row_are_collected() {
    let importer = importer_with_existing().await;

    let preview = importer
        .preview(
            csv_upload("customers.csv", "姓名,电话,邮箱\n,12345,not-an-email\n"),
            ImportTarget::Customers,
        )
        .await
        .unwrap();

    assert_eq!(preview.invalid_rows, 1);
    let fields: Vec<&str> = preview.errors.iter().map(|e| e.field.as_str()).collect();
    assert!(fields.contains(&"name"));
    assert!(fields.contains(&"phone"));
    assert!(fields.contains(&"email"));
    assert!(preview.errors.iter().all(|e| e.row == 1));
}

#[tokio::test]
async fn test_file_too_large_is_rejected_without_staging() {
    let importer = CrmImporterImpl::new(MockRecordRepository::new(), MockConfig::with_max_file_size(10))
        .await
        .unwrap();

    let err = importer
        .preview(csv_upload("customers.csv", CUSTOMERS_CSV), ImportTarget::Customers)
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::FileTooLarge { limit: 10, .. }));
    assert!(err.is_fatal_to_import());
    assert!(importer.preview_store().is_empty().unwrap());
}

#[tokio::test]
async fn test_unsupported_format_is_rejected() {
    let importer = importer_with_existing().await;

    let mut upload = csv_upload("contacts.pdf", CUSTOMERS_CSV);
    upload.media_type = "application/pdf".to_string();

    let err = importer
        .preview(upload, ImportTarget::Customers)
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::UnsupportedFormat(_)));
    assert!(importer.preview_store().is_empty().unwrap());
}

// ==========================================
// 提交
// ==========================================

#[tokio::test]
async fn test_commit_without_upsert_ignores_duplicates() {
    let importer = importer_with_existing().await;
    let preview = importer
        .preview(csv_upload("customers.csv", CUSTOMERS_CSV), ImportTarget::Customers)
        .await
        .unwrap();

    let result = importer.commit(&preview.preview_id, false).await.unwrap();

    assert_eq!(result.total_rows, 3);
    assert_eq!(result.successful_rows, 1);
    assert_eq!(result.ignored_rows, 2);
    assert_eq!(result.error_rows, 0);
    assert_eq!(result.duplicates_handled, 0);
    assert_eq!(
        result.total_rows,
        result.successful_rows + result.ignored_rows + result.error_rows + result.duplicates_handled
    );

    // 已存在的记录保持原值
    let repo = importer.repository();
    let existing = repo.get(ImportTarget::Customers, "0900000000").unwrap();
    assert_eq!(existing.get_text("name"), Some("李四旧"));

    // 文件内首次出现者被写入
    let created = repo.get(ImportTarget::Customers, "0912345678").unwrap();
    assert_eq!(created.get_text("name"), Some("王小明"));
}

#[tokio::test]
async fn test_commit_with_upsert_updates_existing_only() {
    let importer = importer_with_existing().await;
    let preview = importer
        .preview(csv_upload("customers.csv", CUSTOMERS_CSV), ImportTarget::Customers)
        .await
        .unwrap();

    let result = importer.commit(&preview.preview_id, true).await.unwrap();

    assert_eq!(result.successful_rows, 1);
    assert_eq!(result.duplicates_handled, 1);
    assert_eq!(result.ignored_rows, 1);
    assert_eq!(result.error_rows, 0);
    assert!(result.upsert);

    let repo = importer.repository();
    let updated = repo.get(ImportTarget::Customers, "0900000000").unwrap();
    assert_eq!(updated.get_text("name"), Some("李四"));
    assert_eq!(updated.get_text("email"), Some("lisi@example.com"));

    // 文件内重复行即使 upsert 也不覆盖首次出现者
    let first = repo.get(ImportTarget::Customers, "0912345678").unwrap();
    assert_eq!(first.get_text("name"), Some("王小明"));
}

#[tokio::test]
async fn test_second_commit_is_rejected() {
    let importer = importer_with_existing().await;
    let preview = importer
        .preview(csv_upload("customers.csv", CUSTOMERS_CSV), ImportTarget::Customers)
        .await
        .unwrap();

    importer.commit(&preview.preview_id, false).await.unwrap();
    let writes_after_first = importer.repository().write_attempts();

    let err = importer.commit(&preview.preview_id, false).await.unwrap_err();
    assert!(matches!(err, ImportError::PreviewAlreadyConsumed(_)));
    assert_eq!(importer.repository().write_attempts(), writes_after_first);
}

#[tokio::test]
async fn test_unknown_preview_id_is_rejected() {
    let importer = importer_with_existing().await;
    let err = importer.commit("no-such-preview", false).await.unwrap_err();
    assert!(matches!(err, ImportError::PreviewNotFound(_)));
}

#[tokio::test]
async fn test_expired_preview_cannot_be_committed() {
    let config = MockConfig {
        preview_ttl_secs: 0,
        ..MockConfig::default()
    };
    let importer = CrmImporterImpl::new(MockRecordRepository::new(), config)
        .await
        .unwrap();
    let preview = importer
        .preview(csv_upload("customers.csv", CUSTOMERS_CSV), ImportTarget::Customers)
        .await
        .unwrap();

    let err = importer.commit(&preview.preview_id, false).await.unwrap_err();
    assert!(matches!(err, ImportError::PreviewExpired(_)));
    assert_eq!(importer.repository().write_attempts(), 0);
}

#[tokio::test]
async fn test_persistence_failure_is_isolated_to_its_row() {
    let repo = MockRecordRepository::new();
    repo.fail_on("0922000002");
    let importer = CrmImporterImpl::new(repo, MockConfig::default()).await.unwrap();

    let csv = "姓名,电话\n甲,0922000001\n乙,0922000002\n丙,0922000003\n";
    let preview = importer
        .preview(csv_upload("customers.csv", csv), ImportTarget::Customers)
        .await
        .unwrap();
    assert_eq!(preview.valid_rows, 3);

    let result = importer.commit(&preview.preview_id, false).await.unwrap();
    assert_eq!(result.successful_rows, 2);
    assert_eq!(result.error_rows, 1);
    assert_eq!(result.errors.len(), 1);

    let error = &result.errors[0];
    assert_eq!(error.row, 2);
    assert_eq!(error.field, "phone");
    assert_eq!(error.kind, FieldErrorKind::PersistenceError);

    let repo = importer.repository();
    assert!(repo.get(ImportTarget::Customers, "0922000001").is_some());
    assert!(repo.get(ImportTarget::Customers, "0922000002").is_none());
    assert!(repo.get(ImportTarget::Customers, "0922000003").is_some());
}

#[tokio::test]
async fn test_commit_writes_batch_audit() {
    let importer = importer_with_existing().await;
    let preview = importer
        .preview(csv_upload("customers.csv", CUSTOMERS_CSV), ImportTarget::Customers)
        .await
        .unwrap();
    importer.commit(&preview.preview_id, true).await.unwrap();

    let batches = importer.repository().batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].batch_id, preview.preview_id);
    assert_eq!(batches[0].target, ImportTarget::Customers);
    assert_eq!(batches[0].duplicates_handled, 1);
    assert!(batches[0].upsert);
}

// ==========================================
// 重新映射
// ==========================================

#[tokio::test]
async fn test_remap_produces_new_preview_and_invalidates_old() {
    let importer = importer_with_existing().await;
    let csv = "姓名,联络方式\n甲,0922000001\n乙,0922000002\n";

    let first = importer
        .preview(csv_upload("customers.csv", csv), ImportTarget::Customers)
        .await
        .unwrap();
    assert_eq!(first.unmapped_required, vec!["phone"]);
    assert_eq!(first.invalid_rows, 2);

    // 必填字段未映射 → 拒绝提交，预览不被消费
    match importer.commit(&first.preview_id, false).await {
        Err(ImportError::RequiredFieldsUnmapped(fields)) => assert_eq!(fields, vec!["phone"]),
        other => panic!("Expected RequiredFieldsUnmapped, got {:?}", other.map(|r| r.total_rows)),
    }
    assert_eq!(importer.repository().write_attempts(), 0);
    assert!(importer.preview_store().get(&first.preview_id).is_ok());

    let phone_index = first
        .suggested_mappings
        .iter()
        .position(|m| m.target_field == "phone")
        .unwrap();

    // 未知列 → 报错且原预览仍可用
    let err = importer
        .remap(
            &first.preview_id,
            &[MappingOverride {
                index: phone_index,
                source_field: "不存在的列".to_string(),
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::UnknownColumn(_)));
    assert!(importer.preview_store().get(&first.preview_id).is_ok());

    let second = importer
        .remap(
            &first.preview_id,
            &[MappingOverride {
                index: phone_index,
                source_field: "联络方式".to_string(),
            }],
        )
        .await
        .unwrap();

    assert_ne!(second.preview_id, first.preview_id);
    assert!(second.unmapped_required.is_empty());
    assert_eq!(second.valid_rows, 2);
    assert_eq!(second.invalid_rows, 0);

    let err = importer.commit(&first.preview_id, false).await.unwrap_err();
    assert!(matches!(err, ImportError::PreviewNotFound(_)));

    let result = importer.commit(&second.preview_id, false).await.unwrap();
    assert_eq!(result.successful_rows, 2);
}

#[tokio::test]
async fn test_remap_rejects_out_of_range_index() {
    let importer = importer_with_existing().await;
    let preview = importer
        .preview(csv_upload("customers.csv", CUSTOMERS_CSV), ImportTarget::Customers)
        .await
        .unwrap();

    let err = importer
        .remap(
            &preview.preview_id,
            &[MappingOverride {
                index: 99,
                source_field: "电话".to_string(),
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::MappingIndexOutOfRange { index: 99, .. }));
}

#[tokio::test]
async fn test_failed_remap_keeps_original_preview_committable() {
    let repo = MockRecordRepository::new();
    repo.seed(existing_customer("0900000000", "李四旧"));
    // 第一次查重（预览）成功，第二次（重新映射）失败
    repo.fail_lookups_after(1);
    let importer = CrmImporterImpl::new(repo, MockConfig::default())
        .await
        .unwrap();

    let preview = importer
        .preview(csv_upload("customers.csv", CUSTOMERS_CSV), ImportTarget::Customers)
        .await
        .unwrap();
    let email_index = preview
        .suggested_mappings
        .iter()
        .position(|m| m.target_field == "email")
        .unwrap();

    let err = importer
        .remap(
            &preview.preview_id,
            &[MappingOverride {
                index: email_index,
                source_field: String::new(),
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::Repository(_)));
    assert_eq!(importer.preview_store().len().unwrap(), 1);

    let result = importer.commit(&preview.preview_id, false).await.unwrap();
    assert_eq!(result.total_rows, 3);
    assert_eq!(result.successful_rows, 1);
}

#[tokio::test]
async fn test_xlsx_upload_normalizes_numeric_phone_and_date_cells() {
    let importer = importer_with_existing().await;
    let upload = UploadedFile {
        file_name: "customers_sample.xlsx".to_string(),
        media_type: MEDIA_TYPE_XLSX.to_string(),
        payload: include_bytes!("fixtures/customers_sample.xlsx").to_vec(),
    };

    let preview = importer
        .preview(upload, ImportTarget::Customers)
        .await
        .unwrap();
    assert_eq!(preview.detected_columns, vec!["姓名", "电话", "邮箱", "生日"]);
    assert_eq!(preview.total_rows, 2);
    assert_eq!(preview.valid_rows, 1);
    assert_eq!(preview.duplicate_rows, 1);
    assert!(preview.errors.is_empty());

    let result = importer.commit(&preview.preview_id, false).await.unwrap();
    assert_eq!(result.successful_rows, 1);

    // 数值单元格 912345678 丢失前导 0，导入后补回
    let stored = importer
        .repository()
        .get(ImportTarget::Customers, "0912345678")
        .expect("客户未写入");
    assert_eq!(stored.get("name"), Some(&FieldValue::Text("王小明".to_string())));
    assert_eq!(
        stored.get("birthday"),
        Some(&FieldValue::Date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()))
    );
}
