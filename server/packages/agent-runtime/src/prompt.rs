use crate::BurnPlanParameters;

/// Renders the forensic-analysis instructions sent as the `prompt` field.
pub fn burn_plan_instructions(params: &BurnPlanParameters) -> String {
    let amount = &params.amount;
    let timeline = params.timeline;
    let stupidity = &params.stupidity;
    let architecture = &params.architecture;
    let burning_style = &params.burning_style;

    format!(
        r#"AWS SPENDING FORENSICS ANALYSIS

TOTAL AMOUNT SPENT: {amount}
TIMELINE: {timeline} days (Day 0 to Day {timeline})
EFFICIENCY LEVEL: {stupidity}
ARCHITECTURE TYPE: {architecture}
BURNING STYLE: {burning_style}

CRITICAL: You must analyze exactly {amount} in spending over {timeline} days.

Analyze this AWS spending scenario. Based on the "{stupidity}" efficiency level,
"{architecture}" architecture type, and "{burning_style}" burning style, determine what
over-provisioned and over-engineered AWS resources were likely deployed over the {timeline}
day period that would result in EXACTLY {amount} in total costs.

ARCHITECTURE TYPE REQUIREMENTS:
- serverless: Lambda, API Gateway, DynamoDB, Step Functions, EventBridge, SQS, SNS, AppSync, Cognito
- kubernetes: EKS, ECR, container instances, load balancers, persistent volumes, service mesh
- traditional: EC2, RDS, EBS, ELB, Auto Scaling, VPC components, classic infrastructure
- mixed: services from every architecture type in one chaotic over-engineered mess

BURNING STYLE REQUIREMENTS:
- horizontal: spread spending evenly across the whole {timeline} day timeline. Most services
  should have start_day=0 and end_day={timeline} or -1.
- vertical: burst spending. Services spin up and down at different times; use varied
  start_day and end_day values for one-shot expensive operations or short-lived resources.

Provide a detailed forensic analysis including:

1. Services Deployed: the AWS services behind this spending level, matched to the efficiency level.
2. Resource Configurations: exact resource types, instance sizes, quantities and storage amounts.
3. Cost Breakdown: how {amount} is distributed across services over {timeline} days, with
   instance types, quantities, start day, end day, duration used and realistic AWS pricing.
   The total_calculated_cost must be within 10% of {amount}.
4. Deployment Scenario: the likely use case and why these resources were chosen.
5. Efficiency Level Interpretation:
   - Mildly dumb: minor over-provisioning, forgotten test resources
   - Moderately stupid: significant redundancy, expensive instances for simple workloads
   - Very stupid: extreme over-engineering, multi-region for simple apps
   - Brain damage: obscure or specialized services for basic needs

Use real AWS service names, instance types, quantities and pricing."#
    )
}
