use super::Remote;
use crate::error::RemoteError;
use crate::resource::{Function, FunctionVersion, Tags};
use crate::services::lambda::LambdaApi;
use crate::time::parse_timestamp;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_lambda as lambda;

/// [`LambdaApi`] over the Lambda client.
#[derive(Debug, Clone)]
pub struct AwsLambda {
    client: lambda::Client,
}

impl AwsLambda {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: lambda::Client::new(config),
        }
    }
}

#[async_trait]
impl LambdaApi for AwsLambda {
    async fn list_functions(&self) -> Result<Vec<Function>, RemoteError> {
        let mut functions = Vec::new();
        let mut pages = self.client.list_functions().into_paginator().send();
        while let Some(page) = pages.next().await.transpose().remote("ListFunctions")? {
            for f in page.functions() {
                let Some(name) = f.function_name() else { continue };
                functions.push(Function {
                    name: name.to_string(),
                    arn: f.function_arn().unwrap_or_default().to_string(),
                    last_modified: f.last_modified().and_then(parse_timestamp),
                });
            }
        }
        Ok(functions)
    }

    async fn function_tags(&self, arn: &str) -> Result<Tags, RemoteError> {
        let resp = self
            .client
            .list_tags()
            .resource(arn)
            .send()
            .await
            .remote("ListTags")?;
        Ok(resp
            .tags()
            .map(|tags| tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn list_versions(&self, function: &str) -> Result<Vec<FunctionVersion>, RemoteError> {
        let mut versions = Vec::new();
        let mut pages = self
            .client
            .list_versions_by_function()
            .function_name(function)
            .into_paginator()
            .send();
        while let Some(page) = pages
            .next()
            .await
            .transpose()
            .remote("ListVersionsByFunction")?
        {
            versions.extend(page.versions().iter().filter_map(|v| {
                v.version().map(|version| FunctionVersion {
                    version: version.to_string(),
                })
            }));
        }
        Ok(versions)
    }

    async fn delete_version(&self, function: &str, version: &str) -> Result<(), RemoteError> {
        self.client
            .delete_function()
            .function_name(function)
            .qualifier(version)
            .send()
            .await
            .remote("DeleteFunction")?;
        Ok(())
    }

    async fn delete_function(&self, function: &str) -> Result<(), RemoteError> {
        self.client
            .delete_function()
            .function_name(function)
            .send()
            .await
            .remote("DeleteFunction")?;
        Ok(())
    }
}
