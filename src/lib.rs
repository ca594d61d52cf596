//! 学习助手服务
//! 班级文档管理、生成练习题/闪卡/速查表，以及闪卡与测验两个学习会话

pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod server;
pub mod services;
pub mod utils;
