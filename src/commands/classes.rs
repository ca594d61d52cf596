// 班级命令模块
// 班级增删改查与班级文件管理

use super::{AppState, CommandError};
use crate::models::{is_valid_color, ClassInfo, StoredFile, CLASS_COLORS};
use crate::services::storage::validate_file_name;
use serde::{Deserialize, Serialize};

/// 创建班级请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClassRequest {
    pub name: String,
    pub color: Option<String>,
    pub user_id: Option<String>,
}

/// 修改班级请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateClassRequest {
    pub color: String,
}

fn check_color(color: &str) -> Result<(), CommandError> {
    if is_valid_color(color) {
        Ok(())
    } else {
        Err(CommandError::BadRequest(format!("Invalid color: {}", color)))
    }
}

fn check_file_name(file_name: &str) -> Result<(), CommandError> {
    validate_file_name(file_name).map_err(|e| CommandError::BadRequest(e.to_string()))
}

pub(crate) fn require_class<G>(state: &AppState<G>, class_id: i64) -> Result<ClassInfo, CommandError> {
    state
        .db
        .get_class(class_id)?
        .ok_or_else(|| CommandError::NotFound(format!("Class {} not found", class_id)))
}

// ==================== 班级 ====================

/// 列出班级
pub async fn list_classes<G>(state: &AppState<G>, user_id: Option<String>) -> Result<Vec<ClassInfo>, CommandError> {
    Ok(state.db.list_classes(user_id.as_deref())?)
}

/// 创建班级，未指定颜色时使用默认色
pub async fn create_class<G>(state: &AppState<G>, request: CreateClassRequest) -> Result<ClassInfo, CommandError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(CommandError::BadRequest("Class name is required".to_string()));
    }

    let color = request.color.as_deref().unwrap_or(CLASS_COLORS[0]);
    check_color(color)?;

    let class = state.db.create_class(request.user_id.as_deref(), name, color)?;
    log::info!("created class {} ({})", class.id, class.name);
    Ok(class)
}

pub async fn update_class_color<G>(
    state: &AppState<G>,
    class_id: i64,
    request: UpdateClassRequest,
) -> Result<ClassInfo, CommandError> {
    check_color(&request.color)?;
    if !state.db.update_class_color(class_id, &request.color)? {
        return Err(CommandError::NotFound(format!("Class {} not found", class_id)));
    }
    require_class(state, class_id)
}

/// 删除班级：先删文件，再删生成内容和班级记录
pub async fn delete_class<G>(state: &AppState<G>, class_id: i64) -> Result<(), CommandError> {
    require_class(state, class_id)?;

    let removed = state.storage.remove_all(class_id).await?;
    let closed = state.views.close_class(class_id);
    state.db.delete_class(class_id)?;

    log::info!(
        "deleted class {} ({} files removed, {} views closed)",
        class_id,
        removed,
        closed
    );
    Ok(())
}

// ==================== 班级文件 ====================

pub async fn list_files<G>(state: &AppState<G>, class_id: i64) -> Result<Vec<StoredFile>, CommandError> {
    require_class(state, class_id)?;
    Ok(state.storage.list(class_id).await?)
}

/// 上传文件；同名文件已存在时拒绝
pub async fn upload_file<G>(
    state: &AppState<G>,
    class_id: i64,
    file_name: &str,
    bytes: &[u8],
) -> Result<StoredFile, CommandError> {
    require_class(state, class_id)?;
    check_file_name(file_name)?;
    if state.storage.exists(class_id, file_name).await? {
        return Err(CommandError::Conflict(format!("File {} already exists", file_name)));
    }
    Ok(state.storage.upload(class_id, file_name, bytes).await?)
}

pub async fn delete_file<G>(state: &AppState<G>, class_id: i64, file_name: &str) -> Result<(), CommandError> {
    check_file_name(file_name)?;
    let removed = state
        .storage
        .remove(class_id, &[file_name.to_string()])
        .await?;
    if removed == 0 {
        return Err(CommandError::NotFound(format!("File {} not found", file_name)));
    }
    Ok(())
}

pub async fn download_file<G>(state: &AppState<G>, class_id: i64, file_name: &str) -> Result<Vec<u8>, CommandError> {
    check_file_name(file_name)?;
    if !state.storage.exists(class_id, file_name).await? {
        return Err(CommandError::NotFound(format!("File {} not found", file_name)));
    }
    Ok(state.storage.read(class_id, file_name).await?)
}
