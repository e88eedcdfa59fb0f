// ==========================================
// CRM 导入管道 - 导入器实现
// ==========================================
// 职责: 组装各组件，从上传字节流到预览、提交
// 流程: 解析 → 映射 → 校验 → 查重 → 暂存 → (重新映射) → 提交
// ==========================================

use crate::config::{ImportConfigReader, ImportSettings};
use crate::domain::import::{CommitResult, FieldMapping, ImportPreview, MappingOverride};
use crate::domain::record::RawRow;
use crate::domain::types::{ImportStage, ImportTarget};
use crate::importer::commit_executor::CommitExecutor;
use crate::importer::crm_importer_trait::{CrmImporter, UploadedFile};
use crate::importer::duplicate_resolver::DuplicateResolver;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::FieldMapper;
use crate::importer::file_parser::UniversalFileParser;
use crate::importer::preview_store::{PreviewStore, StagedImport};
use crate::importer::row_validator::RowValidator;
use crate::importer::schema::SchemaRegistry;
use crate::repository::record_repo::RecordRepository;
use async_trait::async_trait;
use tracing::{debug, info, instrument};

// ==========================================
// CrmImporterImpl - 导入器实现
// ==========================================
pub struct CrmImporterImpl<R, C>
where
    R: RecordRepository,
    C: ImportConfigReader,
{
    // 数据访问层
    repo: R,

    // 配置读取器
    config: C,

    // 预览暂存
    store: PreviewStore,
}

impl<R, C> CrmImporterImpl<R, C>
where
    R: RecordRepository,
    C: ImportConfigReader,
{
    /// 创建导入器（预览有效期取自配置）
    ///
    /// # 参数
    /// - repo: 记录仓储
    /// - config: 配置读取器
    pub async fn new(repo: R, config: C) -> ImportResult<Self> {
        let settings = load_settings(&config).await?;
        Ok(Self::with_store(repo, config, PreviewStore::new(settings.preview_ttl())))
    }

    /// 使用指定的预览暂存创建导入器
    pub fn with_store(repo: R, config: C, store: PreviewStore) -> Self {
        Self {
            repo,
            config,
            store,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn preview_store(&self) -> &PreviewStore {
        &self.store
    }

    /// 校验 + 查重（预览与重新映射共用，不触碰预览存储）
    async fn classify(
        &self,
        target: ImportTarget,
        file_name: String,
        detected_columns: Vec<String>,
        rows: Vec<RawRow>,
        mappings: Vec<FieldMapping>,
    ) -> ImportResult<StagedImport> {
        let schema = SchemaRegistry::schema_for(target);

        debug!(file_name = %file_name, stage = %ImportStage::Mapped, "开始行校验");
        let validated = RowValidator::validate_rows(&rows, &mappings, schema);
        let outcomes = DuplicateResolver::resolve(schema, validated, &self.repo).await?;

        Ok(StagedImport {
            target,
            file_name,
            detected_columns,
            rows,
            mappings,
            outcomes,
        })
    }
}

async fn load_settings<C>(config: &C) -> ImportResult<ImportSettings>
where
    C: ImportConfigReader + ?Sized,
{
    ImportSettings::load(config)
        .await
        .map_err(|e| ImportError::Config {
            key: "import".to_string(),
            message: e.to_string(),
        })
}

#[async_trait]
impl<R, C> CrmImporter for CrmImporterImpl<R, C>
where
    R: RecordRepository,
    C: ImportConfigReader,
{
    #[instrument(skip(self, upload), fields(file_name = %upload.file_name, import_target = %target))]
    async fn preview(
        &self,
        upload: UploadedFile,
        target: ImportTarget,
    ) -> ImportResult<ImportPreview> {
        let settings = load_settings(&self.config).await?;
        info!(size = upload.payload.len(), media_type = %upload.media_type, "开始生成预览");

        // 1. 行提取
        let parser = UniversalFileParser::new(settings.max_file_size_bytes);
        let sheet = parser.extract(&upload.payload, &upload.media_type, &upload.file_name)?;
        debug!(stage = %ImportStage::Uploaded, rows = sheet.rows.len(), "文件已解析");

        // 2. 建议映射
        let schema = SchemaRegistry::schema_for(target);
        let mapper = FieldMapper::new(settings.fuzzy_match_threshold);
        let mappings = mapper.suggest_mappings(&sheet.columns, schema);

        // 3~5. 校验、查重、暂存
        let staged = self
            .classify(target, upload.file_name, sheet.columns, sheet.rows, mappings)
            .await?;
        self.store.create(staged)
    }

    #[instrument(skip(self, overrides), fields(overrides = overrides.len()))]
    async fn remap(
        &self,
        preview_id: &str,
        overrides: &[MappingOverride],
    ) -> ImportResult<ImportPreview> {
        let settings = load_settings(&self.config).await?;

        // 先在副本上应用调整，任何错误都不影响原预览
        let current = self.store.get(preview_id)?;
        let mapper = FieldMapper::new(settings.fuzzy_match_threshold);
        let mut mappings = current.suggested_mappings.clone();
        for item in overrides {
            mapper.apply_override(
                &mut mappings,
                item.index,
                &item.source_field,
                &current.detected_columns,
            )?;
        }

        // 新内容全部生成后才替换原预览；查重失败时原预览仍可提交
        let staged = self.store.staged_for_remap(preview_id)?;
        info!(
            preview_id,
            file_name = %staged.file_name,
            "按新映射重新生成预览"
        );

        let remapped = self
            .classify(
                staged.target,
                staged.file_name,
                staged.detected_columns,
                staged.rows,
                mappings,
            )
            .await?;
        self.store.replace(preview_id, remapped)
    }

    #[instrument(skip(self))]
    async fn commit(&self, preview_id: &str, upsert: bool) -> ImportResult<CommitResult> {
        let settings = load_settings(&self.config).await?;
        let executor = CommitExecutor::new(settings.commit_concurrency);
        executor.commit(&self.store, &self.repo, preview_id, upsert).await
    }
}
