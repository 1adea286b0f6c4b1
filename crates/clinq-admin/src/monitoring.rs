//! 流转监控指标
//!
//! 以Prometheus格式导出流转动作、分诊结果和病区占用

use anyhow::Result;
use async_trait::async_trait;
use clinq_core::{AuditAction, AuditEntry, AuditSink};
use clinq_workflow::FlowOverview;
use prometheus::{IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

/// 流转指标收集器
#[derive(Clone)]
pub struct FlowMetrics {
    /// Prometheus指标注册表
    registry: Registry,
    /// 流转动作计数
    flow_actions_total: IntCounterVec,
    /// 分诊结果计数
    triage_total: IntCounterVec,
    /// 病区占用床位
    ward_occupied_beds: IntGaugeVec,
    /// 病区容量
    ward_capacity: IntGaugeVec,
    /// 候诊人数
    queue_length: IntGauge,
}

impl FlowMetrics {
    /// 创建新的指标收集器
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let flow_actions_total = IntCounterVec::new(
            Opts::new("clinq_flow_actions_total", "Total number of patient flow actions"),
            &["action"],
        )?;

        let triage_total = IntCounterVec::new(
            Opts::new("clinq_triage_total", "Total number of triage classifications"),
            &["level"],
        )?;

        let ward_occupied_beds = IntGaugeVec::new(
            Opts::new("clinq_ward_occupied_beds", "Occupied beds per ward"),
            &["ward"],
        )?;

        let ward_capacity = IntGaugeVec::new(
            Opts::new("clinq_ward_capacity", "Bed capacity per ward"),
            &["ward"],
        )?;

        let queue_length = IntGauge::with_opts(Opts::new(
            "clinq_queue_length",
            "Patients awaiting consultation",
        ))?;

        // 注册所有指标
        registry.register(Box::new(flow_actions_total.clone()))?;
        registry.register(Box::new(triage_total.clone()))?;
        registry.register(Box::new(ward_occupied_beds.clone()))?;
        registry.register(Box::new(ward_capacity.clone()))?;
        registry.register(Box::new(queue_length.clone()))?;

        Ok(Self {
            registry,
            flow_actions_total,
            triage_total,
            ward_occupied_beds,
            ward_capacity,
            queue_length,
        })
    }

    /// 用总览刷新病区与队列指标
    pub fn record_overview(&self, overview: &FlowOverview) {
        for ward in &overview.wards {
            self.ward_occupied_beds
                .with_label_values(&[ward.id.as_str()])
                .set(i64::from(ward.occupied));
            self.ward_capacity
                .with_label_values(&[ward.id.as_str()])
                .set(i64::from(ward.capacity));
        }
        self.queue_length.set(overview.queue_length as i64);
    }

    pub fn action_count(&self, action: AuditAction) -> u64 {
        self.flow_actions_total
            .with_label_values(&[action.as_str()])
            .get()
    }

    /// 获取Prometheus指标
    pub fn render(&self) -> Result<String> {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }
}

#[async_trait]
impl AuditSink for FlowMetrics {
    async fn record(&self, entry: AuditEntry) {
        self.flow_actions_total
            .with_label_values(&[entry.action.as_str()])
            .inc();

        if entry.action == AuditAction::VitalsCapture {
            if let Some(level) = entry.urgency_after {
                self.triage_total.with_label_values(&[level.as_str()]).inc();
            }
        }
    }
}
